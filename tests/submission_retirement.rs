// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Submission, fence-gated reuse of command buffers and upload memory, and garbage collection.

use states_and_fences::imp::Command;
use states_and_fences::imp::recording::RecordingBackend;
use states_and_fences::{
    Buffer, BufferDesc, CommandList, CommandListParameters, Device, DeviceConfig, Error, QueueType,
    RecordingSink, ResourceStates,
};
use std::sync::Arc;
use std::time::Duration;

fn device() -> (Device<RecordingBackend>, Arc<RecordingBackend>, Arc<RecordingSink>) {
    device_with(DeviceConfig::default())
}

fn device_with(
    config: DeviceConfig) -> (Device<RecordingBackend>, Arc<RecordingBackend>, Arc<RecordingSink>,
) {
    let sink = RecordingSink::new();
    let backend = Arc::new(RecordingBackend::new());
    let config = config.with_message_sink(sink.clone());
    let device = Device::with_shared_backend(backend.clone(), config);
    (device, backend, sink)
}

fn staging(device: &Device<RecordingBackend>, size: u64) -> Buffer {
    device
        .create_buffer(BufferDesc::new(size).with_initial_state(ResourceStates::COPY_DEST, true))
        .expect("buffer")
}

/// Records one upload of `len` bytes and submits it.
fn submit_upload(
    device: &Device<RecordingBackend>,
    list: &mut CommandList<RecordingBackend>,
    buffer: &Buffer,
    len: usize,
) -> u64 {
    list.open().expect("open");
    list.write_buffer(buffer, &vec![0xab; len], 0).expect("write");
    list.close().expect("close");
    device.execute_command_lists(&mut [&mut *list]).expect("execute")
}

fn upload_addresses(list: &CommandList<RecordingBackend>) -> Vec<u64> {
    list.native()
        .expect("native")
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            Command::UploadBuffer { src_address, .. } => Some(*src_address),
            _ => None,
        })
        .collect()
}

#[test]
fn command_buffers_are_reused_only_after_their_fence() {
    let (device, backend, sink) = device();
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());

    assert_eq!(submit_upload(&device, &mut list, &buffer, 16), 1);
    assert_eq!(device.queue_pooled_command_buffers(QueueType::Graphics), 1);
    //instance 1 is still executing
    assert_eq!(submit_upload(&device, &mut list, &buffer, 16), 2);
    assert_eq!(backend.command_buffers_created(), 2);

    backend.complete(QueueType::Graphics, 1);
    list.open().expect("open");
    let native = list.native().expect("native");
    assert_eq!(native.serial(), 1);
    assert_eq!(native.resets(), 1);
    assert_eq!(backend.command_buffers_created(), 2);
    assert_eq!(device.queue_pooled_command_buffers(QueueType::Graphics), 1);
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn garbage_collection_follows_the_fence() {
    let (device, backend, _sink) = device();
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());
    submit_upload(&device, &mut list, &buffer, 16);
    submit_upload(&device, &mut list, &buffer, 16);
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 2);

    assert_eq!(device.run_garbage_collection(), 0);
    backend.complete(QueueType::Graphics, 1);
    assert_eq!(device.run_garbage_collection(), 1);
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 1);
    assert_eq!(device.queue_last_completed(QueueType::Graphics), 1);

    backend.complete_all();
    assert_eq!(device.run_garbage_collection(), 1);
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 0);
}

#[test]
fn waiting_for_idle_gives_up() {
    let config = DeviceConfig::default().with_idle_wait_timeout(Duration::from_millis(20));
    let (device, backend, _sink) = device_with(config);
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());
    submit_upload(&device, &mut list, &buffer, 16);

    let result = device.wait_for_idle();
    assert!(matches!(
        result,
        Err(Error::WaitTimeout {
            queue: QueueType::Graphics,
            value: 1,
            ..
        })
    ));
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 1);

    backend.complete_all();
    device.wait_for_idle().expect("idle");
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 0);
    //already reached
    device.wait_for_instance(QueueType::Graphics, 1).expect("instance 1");
}

#[test]
fn waiting_on_a_self_completing_backend() {
    let sink = RecordingSink::new();
    let device = Device::new(
        RecordingBackend::new().with_auto_complete(true),
        DeviceConfig::default().with_message_sink(sink.clone()),
    );
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());
    let instance = submit_upload(&device, &mut list, &buffer, 16);
    device.wait_for_instance(QueueType::Graphics, instance).expect("wait");
    device.wait_for_idle().expect("idle");
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 0);
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn upload_chunks_wait_for_their_submission() {
    let (device, backend, _sink) = device();
    let buffer = staging(&device, 4096);
    let params = CommandListParameters::default().with_upload_chunk_size(4096);
    let mut list = device.create_command_list(params);

    submit_upload(&device, &mut list, &buffer, 3000);
    assert_eq!(backend.chunks_allocated(), 1);
    //the first chunk belongs to instance 1, which hasn't completed
    submit_upload(&device, &mut list, &buffer, 3000);
    assert_eq!(backend.chunks_allocated(), 2);

    backend.complete_all();
    submit_upload(&device, &mut list, &buffer, 3000);
    assert_eq!(backend.chunks_allocated(), 2);
    assert_eq!(list.upload_manager().chunk_count(), 2);
    assert_eq!(list.upload_manager().allocated_memory(), 2 * 4096);
}

#[test]
fn uploads_roll_over_into_new_chunks() {
    let (device, backend, sink) = device();
    let buffer = staging(&device, 4096);
    let params = CommandListParameters::default().with_upload_chunk_size(4096);
    let mut list = device.create_command_list(params);
    list.open().expect("open");
    for _ in 0..3 {
        list.write_buffer(&buffer, &[1; 3000], 0).expect("write");
    }
    list.close().expect("close");

    let mut addresses = upload_addresses(&list);
    assert_eq!(addresses.len(), 3);
    assert!(addresses.iter().all(|a| a % 256 == 0));
    addresses.sort_unstable();
    for pair in addresses.windows(2) {
        assert!(pair[0] + 3000 <= pair[1], "uploads overlap: {pair:?}");
    }
    //none of them fit next to another
    assert_eq!(backend.chunks_allocated(), 3);
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn small_uploads_share_a_chunk() {
    let (device, backend, _sink) = device();
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());
    list.open().expect("open");
    for _ in 0..4 {
        list.write_buffer(&buffer, &[2; 100], 0).expect("write");
    }
    list.close().expect("close");

    let addresses = upload_addresses(&list);
    let base = addresses[0];
    assert_eq!(addresses, vec![base, base + 256, base + 512, base + 768]);
    assert_eq!(backend.chunks_allocated(), 1);
}

#[test]
fn submissions_signal_consecutive_values() {
    let (device, backend, _sink) = device();
    let buffer = staging(&device, 256);
    let mut graphics = device.create_command_list(CommandListParameters::default());
    let params = CommandListParameters::default().with_queue_type(QueueType::Copy);
    let mut copy = device.create_command_list(params);
    for _ in 0..3 {
        submit_upload(&device, &mut graphics, &buffer, 4);
    }
    //queues count independently
    assert_eq!(submit_upload(&device, &mut copy, &buffer, 4), 1);

    let submissions = backend.submissions();
    let signals: Vec<(QueueType, u64)> =
        submissions.iter().map(|s| (s.queue, s.signal_value)).collect();
    assert_eq!(
        signals,
        vec![
            (QueueType::Graphics, 1),
            (QueueType::Graphics, 2),
            (QueueType::Graphics, 3),
            (QueueType::Copy, 1)
        ]
    );
    assert!(submissions.iter().all(|s| s.command_buffers.len() == 1));
    assert_eq!(device.queue_last_submitted(QueueType::Graphics), 3);
    assert_eq!(device.queue_last_submitted(QueueType::Copy), 1);
}

#[test]
fn lists_submitted_together_share_an_instance() {
    let (device, backend, _sink) = device();
    let buffer = staging(&device, 256);
    let mut first = device.create_command_list(CommandListParameters::default());
    let mut second = device.create_command_list(CommandListParameters::default());
    for list in [&mut first, &mut second] {
        list.open().expect("open");
        list.write_buffer(&buffer, &[3; 8], 0).expect("write");
        list.close().expect("close");
    }
    assert_eq!(device.execute_command_lists(&mut [&mut first, &mut second]).expect("execute"), 1);

    let submissions = backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].command_buffers.len(), 2);
    assert_eq!(device.queue_in_flight(QueueType::Graphics), 2);
    assert!(first.native().is_none());
    assert!(!first.is_closed());
}

#[test]
fn bad_submissions_are_refused() {
    let (device, backend, sink) = device();
    let mut graphics = device.create_command_list(CommandListParameters::default());
    let params = CommandListParameters::default().with_queue_type(QueueType::Compute);
    let mut compute = device.create_command_list(params);
    assert_eq!(device.execute_command_lists(&mut []).expect("nothing"), 0);

    graphics.open().expect("open");
    assert!(matches!(
        device.execute_command_lists(&mut [&mut graphics]),
        Err(Error::InvalidState {
            operation: "execute",
            ..
        })
    ));

    graphics.close().expect("close");
    compute.open().expect("open");
    compute.close().expect("close");
    let result = device.execute_command_lists(&mut [&mut graphics, &mut compute]);
    assert!(matches!(result, Err(Error::Usage(_))));
    assert_eq!(sink.error_count(), 1);
    assert!(backend.submissions().is_empty());
    //both are still closed and can go separately
    assert_eq!(device.execute_command_lists(&mut [&mut graphics]).expect("graphics"), 1);
    assert_eq!(device.execute_command_lists(&mut [&mut compute]).expect("compute"), 1);
}

#[test]
fn discarded_recordings_return_their_resources() {
    let (device, backend, sink) = device();
    let buffer = staging(&device, 4096);
    let params = CommandListParameters::default().with_upload_chunk_size(4096);
    let mut list = device.create_command_list(params);
    list.open().expect("open");
    list.write_buffer(&buffer, &[4; 3000], 0).expect("write");
    list.close().expect("close");

    //reopening without executing throws the recording away
    list.open().expect("reopen");
    let native = list.native().expect("native");
    assert_eq!(native.serial(), 1);
    assert_eq!(native.resets(), 1);
    assert!(native.recorded().is_empty());
    list.write_buffer(&buffer, &[5; 3000], 0).expect("write");
    assert_eq!(backend.command_buffers_created(), 1);
    assert_eq!(backend.chunks_allocated(), 1);
    assert!(backend.submissions().is_empty());
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn event_queries_follow_the_queue_fence() {
    let (device, backend, sink) = device();
    let buffer = staging(&device, 256);
    let mut list = device.create_command_list(CommandListParameters::default());
    let query = device.create_event_query();
    //never set
    assert!(!device.poll_event_query(&query));
    device.wait_event_query(&query).expect("unset wait");

    submit_upload(&device, &mut list, &buffer, 16);
    submit_upload(&device, &mut list, &buffer, 16);
    device.set_event_query(&query, QueueType::Graphics);
    assert_eq!(query.pending_instance(), Some((QueueType::Graphics, 2)));
    assert!(!device.poll_event_query(&query));

    backend.complete(QueueType::Graphics, 1);
    assert!(!device.poll_event_query(&query));
    backend.complete(QueueType::Graphics, 2);
    assert!(device.poll_event_query(&query));
    //resolved queries stay resolved
    submit_upload(&device, &mut list, &buffer, 16);
    assert!(device.poll_event_query(&query));

    device.reset_event_query(&query);
    assert!(!query.is_started());
    assert!(!device.poll_event_query(&query));
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn event_queries_on_idle_queues_resolve_at_once() {
    let (device, _backend, _sink) = device();
    let query = device.create_event_query();
    device.set_event_query(&query, QueueType::Copy);
    assert!(device.poll_event_query(&query));
}

#[test]
fn waiting_on_an_event_query() {
    let (device, backend, _sink) =
        device_with(DeviceConfig::default().with_idle_wait_timeout(Duration::from_millis(20)));
    let buffer = staging(&device, 256);
    let params = CommandListParameters::default().with_queue_type(QueueType::Compute);
    let mut compute = device.create_command_list(params);
    submit_upload(&device, &mut compute, &buffer, 16);
    let query = device.create_event_query();
    device.set_event_query(&query, QueueType::Compute);

    assert!(matches!(
        device.wait_event_query(&query),
        Err(Error::WaitTimeout {
            queue: QueueType::Compute,
            value: 1,
            ..
        })
    ));
    assert!(query.pending_instance().is_some());

    backend.complete(QueueType::Compute, 1);
    device.wait_event_query(&query).expect("wait");
    assert_eq!(query.pending_instance(), None);
    assert!(device.poll_event_query(&query));
}
