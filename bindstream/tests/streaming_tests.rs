//! Streaming buffer integration tests.
//!
//! Parameterised over persistent and per-append mapping.

mod common;

use rstest::rstest;

use bindstream::{
    ContextConfig, DeviceCall, DeviceLimits, ResourceState, StateError, Vertex2d, Vertex2f,
    Vertex3f,
};

use common::TestContext;

fn context(persistent: bool, increment: u64) -> TestContext {
    let limits = DeviceLimits {
        persistent_mapping: persistent,
        ..DeviceLimits::default()
    };
    TestContext::with(limits, ContextConfig::default().with_stream_increment(increment))
}

fn read_2f(ctx: &TestContext, object: u32, offset: u64, count: u64) -> Vec<Vertex2f> {
    let bytes = ctx.backend.read_buffer(object, offset * 8, count * 8);
    bytemuck::pod_collect_to_vec(&bytes)
}

#[rstest]
#[case::persistent(true)]
#[case::mapped_per_append(false)]
fn test_growth_scenario(#[case] persistent: bool) {
    let mut ctx = context(persistent, 1024);
    let stream = ctx.context.streams().unwrap().vec2f();

    assert_eq!(stream.reserve(700).unwrap(), 0);
    assert_eq!(stream.write_cursor(), 700);
    assert_eq!(stream.capacity(), 1024);

    assert_eq!(stream.reserve(500).unwrap(), 0);
    assert_eq!(stream.capacity(), 2048);
    assert_eq!(stream.write_cursor(), 500);
    assert_eq!(stream.grow_count(), 1);
    assert_eq!(stream.generation(), 2);
}

#[rstest]
#[case::persistent(true)]
#[case::mapped_per_append(false)]
fn test_appended_items_reach_buffer(#[case] persistent: bool) {
    let mut ctx = context(persistent, 64);
    let items = [
        Vertex2f::new(0.0, 0.0),
        Vertex2f::new(1.0, 0.0),
        Vertex2f::new(0.0, 1.0),
    ];

    let streams = ctx.context.streams().unwrap();
    let first = streams.vec2f().reserve(3).unwrap();
    let range = streams.vec2f().append(&items).unwrap();
    assert_eq!(range.offset, first);
    assert_eq!(range.count, 3);

    let second = streams.append_2f(&items[..1]).unwrap();
    assert_eq!(second.offset, 3);

    assert_eq!(read_2f(&ctx, range.object, 0, 4), vec![
        items[0], items[1], items[2], items[0]
    ]);
}

#[rstest]
#[case::persistent(true, 1)]
#[case::mapped_per_append(false, 3)]
fn test_map_calls_per_mode(#[case] persistent: bool, #[case] expected_maps: usize) {
    let mut ctx = context(persistent, 64);
    let streams = ctx.context.streams().unwrap();
    for i in 0..3 {
        streams.append_3f(&[Vertex3f::new(i as f32, 0.0, 0.0)]).unwrap();
    }

    assert_eq!(ctx.backend.map_calls(), expected_maps);
    let unmaps = ctx
        .backend
        .count_calls(|call| matches!(call, DeviceCall::Unmap { .. }));
    assert_eq!(unmaps, if persistent { 0 } else { 3 });
}

#[rstest]
#[case::persistent(true)]
#[case::mapped_per_append(false)]
fn test_data_survives_growth(#[case] persistent: bool) {
    let mut ctx = context(persistent, 4);
    let streams = ctx.context.streams().unwrap();

    let old = streams.append_2f(&[Vertex2f::new(7.0, 7.0); 3]).unwrap();
    let new = streams.append_2f(&[Vertex2f::new(9.0, 9.0); 3]).unwrap();
    assert_ne!(old.object, new.object);
    assert!(new.generation > old.generation);
    assert_eq!(new.offset, 0);

    // The old buffer stays alive until disposals are flushed.
    assert!(ctx.backend.is_live(old.object));
    assert_eq!(read_2f(&ctx, old.object, 0, 3), vec![Vertex2f::new(7.0, 7.0); 3]);
    assert!(!ctx.backend.is_mapped(old.object));

    assert_eq!(ctx.context.flush_disposals().unwrap(), 1);
    assert!(!ctx.backend.is_live(old.object));
    assert!(ctx.backend.is_live(new.object));
}

#[test]
fn test_reset_frame_keeps_buffer() {
    let mut ctx = context(true, 16);
    let first = ctx
        .context
        .streams()
        .unwrap()
        .append_2f(&[Vertex2f::default(); 10])
        .unwrap();

    ctx.context.reset_frame().unwrap();
    let second = ctx
        .context
        .streams()
        .unwrap()
        .append_2f(&[Vertex2f::default(); 10])
        .unwrap();

    assert_eq!(second.offset, 0);
    assert_eq!(second.object, first.object);
    assert_eq!(second.generation, first.generation);
}

#[test]
fn test_double_precision_narrows_without_support() {
    let limits = DeviceLimits {
        double_vertex_attributes: false,
        ..DeviceLimits::default()
    };
    let mut ctx = TestContext::with(limits, ContextConfig::default());
    let streams = ctx.context.streams().unwrap();
    assert!(streams.vec2d().is_none());

    let range = streams
        .append_2d(&[Vertex2d::new(1.5, -2.25), Vertex2d::new(3.0, 4.0)])
        .unwrap();
    assert_eq!(range.item_size, 8);
    assert_eq!(read_2f(&ctx, range.object, 0, 2), vec![
        Vertex2f::new(1.5, -2.25),
        Vertex2f::new(3.0, 4.0)
    ]);
}

#[test]
fn test_double_precision_stream_when_supported() {
    let mut ctx = TestContext::new();
    let streams = ctx.context.streams().unwrap();

    let range = streams.append_2d(&[Vertex2d::new(0.1, 0.2)]).unwrap();
    assert_eq!(range.item_size, 16);
    assert_eq!(streams.vec2f().capacity(), 0);
    let bytes = ctx.backend.read_buffer(range.object, 0, 16);
    let items: Vec<Vertex2d> = bytemuck::pod_collect_to_vec(&bytes);
    assert_eq!(items, vec![Vertex2d::new(0.1, 0.2)]);
}

#[test]
fn test_streams_require_current_context() {
    let mut ctx = TestContext::new();
    ctx.context.release_current().unwrap();

    assert!(matches!(
        ctx.context.streams(),
        Err(StateError::InvalidOperation(_))
    ));
}

#[test]
fn test_dropping_context_queues_stream_buffers() {
    let mut ctx = context(true, 1024);
    let range = ctx
        .context
        .streams()
        .unwrap()
        .append_2f(&[Vertex2f::default()])
        .unwrap();
    let buffer = ctx
        .context
        .streams()
        .unwrap()
        .vec2f()
        .buffer()
        .cloned()
        .unwrap();

    let survivor = ctx.context.new_shared().unwrap();
    ctx.backend.clear_calls();
    drop(ctx.context);
    assert_eq!(buffer.state(), ResourceState::Queued);

    // The persistent mapping is released while the context is still current.
    let calls = ctx.backend.calls();
    let unmap = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::Unmap { object } if *object == range.object));
    let released = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::MakeCurrent { context: None }));
    assert!(unmap.unwrap() < released.unwrap());

    survivor.make_current().unwrap();
    assert_eq!(survivor.flush_disposals().unwrap(), 1);
    assert!(!ctx.backend.is_live(range.object));
}
