// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The checking decorator: call order, immediate-list exclusivity and bound-state checks.

use states_and_fences::imp::recording::RecordingBackend;
use states_and_fences::{
    BindingKind, BindingLayout, BindingSetItem, Buffer, BufferDesc, CommandListParameters,
    ComputePipeline, ComputePipelineDesc, ComputeState, Device, DeviceConfig, DrawArguments, Format,
    Lifecycle, MessageSeverity, QueueType, RecordingSink, ResourceStates, ShaderStage, TextureDesc,
    TextureSubresourceSet, ValidationCommandList,
};
use std::sync::Arc;

fn device() -> (Device<RecordingBackend>, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let device = Device::new(
        RecordingBackend::new(),
        DeviceConfig::default().with_message_sink(sink.clone()),
    );
    (device, sink)
}

fn last_message(sink: &RecordingSink) -> String {
    sink.messages().last().map(|(_, text)| text.clone()).unwrap_or_default()
}

fn uav_layout() -> BindingLayout {
    BindingLayout::new([ShaderStage::Compute]).with_item(0, BindingKind::BufferUav)
}

fn compute_pipeline(device: &Device<RecordingBackend>) -> ComputePipeline {
    device
        .create_compute_pipeline(ComputePipelineDesc {
            shader: "main_cs".to_owned(),
            binding_layouts: vec![uav_layout()],
            debug_name: "histogram".to_owned(),
        })
        .expect("pipeline")
}

fn staging(device: &Device<RecordingBackend>) -> Buffer {
    device
        .create_buffer(BufferDesc::new(64).with_initial_state(ResourceStates::COPY_DEST, true))
        .expect("buffer")
}

#[test]
fn a_well_formed_session_passes_through() {
    let (device, sink) = device();
    let buffer = staging(&device);
    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());
    assert_eq!(list.lifecycle(), Lifecycle::Initial);
    list.open().expect("open");
    list.write_buffer(&buffer, &[1; 64], 0).expect("write");
    list.close().expect("close");
    assert_eq!(list.execute().expect("execute"), 1);
    assert_eq!(list.lifecycle(), Lifecycle::Initial);
    assert!(sink.messages().is_empty());
}

#[test]
fn calls_out_of_order_are_refused() {
    let (device, sink) = device();
    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());

    list.close().expect("close");
    assert_eq!(last_message(&sink), "Cannot close a command list before it is opened");
    assert_eq!(list.execute().expect("execute"), 0);
    assert_eq!(
        last_message(&sink),
        "Cannot execute a command list before it is opened and then closed"
    );

    list.open().expect("open");
    list.open().expect("open again");
    assert_eq!(last_message(&sink), "Cannot open a command list that is already open");
    assert_eq!(list.execute().expect("execute"), 0);
    assert_eq!(last_message(&sink), "Cannot execute a command list before it is closed");

    list.close().expect("close");
    list.close().expect("close again");
    assert_eq!(last_message(&sink), "Cannot close a command list that is already closed");
    assert_eq!(sink.error_count(), 5);
    assert_eq!(list.execute().expect("execute"), 1);
}

#[test]
fn immediate_lists_are_exclusive() {
    let (device, sink) = device();
    let mut first = ValidationCommandList::new(&device, CommandListParameters::default());
    let mut second = ValidationCommandList::new(&device, CommandListParameters::default());
    let deferred_params = CommandListParameters::default().with_immediate_execution(false);
    let mut deferred = ValidationCommandList::new(&device, deferred_params);

    first.open().expect("open");
    second.open().expect("open");
    assert_eq!(
        last_message(&sink),
        "Two or more immediate command lists cannot be open at the same time"
    );
    assert_eq!(second.lifecycle(), Lifecycle::Initial);
    //deferred lists don't count
    deferred.open().expect("open");
    assert_eq!(sink.error_count(), 1);

    first.close().expect("close");
    second.open().expect("open after close");
    assert_eq!(second.lifecycle(), Lifecycle::Open);

    //dropping an open list releases its claim
    drop(second);
    let mut third = ValidationCommandList::new(&device, CommandListParameters::default());
    third.open().expect("open after drop");
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn only_deferred_lists_may_be_abandoned() {
    let (device, sink) = device();
    let mut immediate = ValidationCommandList::new(&device, CommandListParameters::default());
    immediate.open().expect("open");
    immediate.close().expect("close");
    immediate.open().expect("reopen");
    assert!(last_message(&sink).starts_with("An immediate command list cannot be abandoned"));
    assert_eq!(immediate.lifecycle(), Lifecycle::Closed);

    let deferred_params = CommandListParameters::default().with_immediate_execution(false);
    let mut deferred = ValidationCommandList::new(&device, deferred_params);
    deferred.open().expect("open");
    deferred.close().expect("close");
    deferred.open().expect("reopen");
    assert_eq!(deferred.lifecycle(), Lifecycle::Open);
    assert_eq!(sink.count(MessageSeverity::Warning), 1);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn recording_needs_an_open_session() {
    let (device, sink) = device();
    let buffer = staging(&device);
    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());
    list.write_buffer(&buffer, &[0; 4], 0).expect("write");
    list.set_buffer_state(&buffer, ResourceStates::SHADER_RESOURCE);
    assert_eq!(list.commit_barriers(), 0);
    assert_eq!(sink.error_count(), 3);
    assert_eq!(
        last_message(&sink),
        "A command list must be opened before any rendering commands can be executed. \
         Actual state: Initial"
    );
}

#[test]
fn binding_sets_must_match_the_pipeline() {
    let (device, sink) = device();
    let pipeline = compute_pipeline(&device);
    let target = device
        .create_buffer(BufferDesc::new(256).with_uavs(true))
        .expect("target");
    let constants = device
        .create_buffer(BufferDesc::new(256).with_constant_buffer())
        .expect("constants");
    let other_layout =
        BindingLayout::new([ShaderStage::Compute]).with_item(0, BindingKind::ConstantBuffer);
    let wrong_set = device
        .create_binding_set(
            other_layout,
            vec![BindingSetItem::ConstantBuffer {
                slot: 0,
                buffer: constants,
            }],
        )
        .expect("set");
    let right_set = device
        .create_binding_set(
            uav_layout(),
            vec![BindingSetItem::BufferUav {
                slot: 0,
                buffer: target.clone(),
            }],
        )
        .expect("set");

    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());
    list.open().expect("open");
    list.set_compute_state(&ComputeState::new(pipeline.clone()));
    assert!(last_message(&sink).contains(
        "Number of binding sets provided (0) does not match the number of binding layouts \
         in the pipeline (1)"
    ));
    list.set_compute_state(&ComputeState::new(pipeline.clone()).with_binding(wrong_set));
    assert!(last_message(&sink).contains("Binding set in slot 0 does not match the layout"));

    //neither state reached the list
    list.dispatch(1, 1, 1);
    assert!(last_message(&sink).starts_with("dispatch requires a Compute state"));
    assert_eq!(sink.error_count(), 3);

    list.begin_tracking_buffer_state(&target, ResourceStates::UNORDERED_ACCESS);
    list.set_compute_state(&ComputeState::new(pipeline).with_binding(right_set));
    list.dispatch(1, 1, 1);
    assert_eq!(sink.error_count(), 3);
    list.close().expect("close");
    assert_eq!(list.execute().expect("execute"), 1);
}

#[test]
fn draws_need_a_graphics_state() {
    let (device, sink) = device();
    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());
    list.open().expect("open");
    list.draw(DrawArguments::vertices(3));
    assert_eq!(
        last_message(&sink),
        "draw requires a Graphics state to be set, the current state is None"
    );
    list.dispatch_rays(8, 8, 1);
    assert_eq!(sink.error_count(), 2);
    list.close().expect("close");
    assert!(list.inner().native().expect("native").commands().is_empty());
}

#[test]
fn buffer_writes_are_checked_before_recording() {
    let (device, sink) = device();
    let buffer = staging(&device);
    let constants = device
        .create_buffer(BufferDesc::volatile_constant_buffer(64))
        .expect("constants");
    let mut list = ValidationCommandList::new(&device, CommandListParameters::default());
    list.open().expect("open");
    list.write_buffer(&buffer, &[0; 48], 32).expect("write");
    assert_eq!(
        last_message(&sink),
        "write_buffer: data size + dest offset is greater than the buffer size"
    );
    list.write_buffer(&constants, &[0; 16], 16).expect("write");
    assert_eq!(
        last_message(&sink),
        "write_buffer: cannot write into volatile buffers with an offset"
    );
    assert_eq!(sink.error_count(), 2);
    list.close().expect("close");
    assert!(list.inner().native().expect("native").commands().is_empty());
}

#[test]
fn operations_must_suit_the_queue() {
    let (device, sink) = device();
    let pipeline = compute_pipeline(&device);
    let depth = device
        .create_texture(
            TextureDesc::new_2d(16, 16, Format::D32)
                .with_render_target(true)
                .with_initial_state(ResourceStates::DEPTH_WRITE, true),
        )
        .expect("depth");
    let buffer = staging(&device);
    let params = CommandListParameters::default().with_queue_type(QueueType::Copy);
    let mut list = ValidationCommandList::new(&device, params);
    list.open().expect("open");
    list.set_compute_state(&ComputeState::new(pipeline));
    assert_eq!(
        last_message(&sink),
        "This command list has type Copy, but the 'set_compute_state' operation requires \
         at least Compute"
    );
    list.clear_depth_stencil_texture(&depth, TextureSubresourceSet::ALL, Some(0.0), None);
    assert_eq!(sink.error_count(), 2);

    //transfers are fine anywhere
    list.write_buffer(&buffer, &[9; 16], 0).expect("write");
    assert_eq!(sink.error_count(), 2);
    list.close().expect("close");
    assert_eq!(list.execute().expect("execute"), 1);
}
