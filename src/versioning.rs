// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Version words.

A version identifies one recording instance on one queue, and whether that instance has been
submitted.  Pooled chunks are stamped with versions so that a single `u64` tells both who owns
the chunk and when it may be reused:

| bits   | meaning                      |
|--------|------------------------------|
| 63     | submitted                    |
| 60..63 | queue index                  |
| 0..60  | instance id (fence value)    |

Version 0 means "free".
*/

use crate::bittricks::pack_flag_field_id;
use crate::config::QueueType;

pub const VERSION_SUBMITTED_FLAG: u64 = 0x8000_0000_0000_0000;
pub const VERSION_QUEUE_SHIFT: u64 = 60;
pub const VERSION_QUEUE_MASK: u64 = 0x7;
pub const VERSION_ID_MASK: u64 = 0x0FFF_FFFF_FFFF_FFFF;

pub fn make_version(id: u64, queue: QueueType, submitted: bool) -> u64 {
    pack_flag_field_id(submitted, queue.index() as u64, id)
}

pub fn version_get_instance(version: u64) -> u64 {
    version & VERSION_ID_MASK
}

pub fn version_get_queue(version: u64) -> Option<QueueType> {
    QueueType::from_index((version >> VERSION_QUEUE_SHIFT) & VERSION_QUEUE_MASK)
}

pub fn version_is_submitted(version: u64) -> bool {
    version & VERSION_SUBMITTED_FLAG != 0
}
