// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::resources::{Buffer, ResourceId};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct AccelStructDesc {
    pub is_top_level: bool,
    /// Size of the result storage.
    pub data_size: u64,
    /// Size of the scratch memory a build needs.
    pub scratch_size: u64,
    pub debug_name: String,
}

#[derive(Debug)]
struct AccelStructShared {
    id: ResourceId,
    desc: AccelStructDesc,
    data_buffer: Buffer,
}

/// A ray-tracing acceleration structure.  Its state is the state of its data buffer.
#[derive(Debug, Clone)]
pub struct AccelStruct(Arc<AccelStructShared>);

impl AccelStruct {
    pub(crate) fn new(desc: AccelStructDesc, data_buffer: Buffer) -> Self {
        AccelStruct(Arc::new(AccelStructShared {
            id: ResourceId::next(),
            desc,
            data_buffer,
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn desc(&self) -> &AccelStructDesc {
        &self.0.desc
    }

    pub fn data_buffer(&self) -> &Buffer {
        &self.0.data_buffer
    }
}
