//! Integration tests for the flowstream engine over the simulated transport.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use flowstream::simulated::{SimulatedConnection, SimulatedHandle};
use flowstream::{
    BufferAttr, ChunkCallback, Connection, Direction, DrainCallback, Error, Latency, SampleFormat,
    StateListener, Stream, StreamFlags, StreamOptions, StreamState, TransportError, TransportEvent,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open(
    options: StreamOptions,
    direction: Direction,
    flags: StreamFlags,
) -> (Rc<SimulatedConnection>, Stream, SimulatedHandle) {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), options).unwrap();
    let device = connection.last_handle().unwrap();
    stream.connect(None, direction, flags).unwrap();
    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Ready);
    (connection, stream, device)
}

fn playback() -> (Rc<SimulatedConnection>, Stream, SimulatedHandle) {
    open(StreamOptions::default(), Direction::Playback, StreamFlags::NONE)
}

fn record() -> (Rc<SimulatedConnection>, Stream, SimulatedHandle) {
    open(StreamOptions::default(), Direction::Record, StreamFlags::NONE)
}

fn count_drains(counter: &Rc<Cell<usize>>) -> Option<DrainCallback> {
    let counter = Rc::clone(counter);
    Some(Box::new(move |_: &mut Stream| {
        counter.set(counter.get() + 1);
        Ok(())
    }))
}

fn log_drain(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> Option<DrainCallback> {
    let log = Rc::clone(log);
    Some(Box::new(move |_: &mut Stream| {
        log.borrow_mut().push(label);
        Ok(())
    }))
}

fn collect_chunks(sink: &Rc<RefCell<Vec<Bytes>>>) -> Option<ChunkCallback> {
    let sink = Rc::clone(sink);
    Some(Box::new(move |_: &mut Stream, chunk: Bytes| {
        sink.borrow_mut().push(chunk);
        Ok(())
    }))
}

type StateLog = Rc<RefCell<Vec<(StreamState, Option<String>)>>>;

fn record_states(log: &StateLog) -> Option<StateListener> {
    let log = Rc::clone(log);
    Some(Box::new(move |state: StreamState, error: Option<&Error>| {
        log.borrow_mut().push((state, error.map(ToString::to_string)));
        Ok(())
    }))
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

#[test]
fn partial_requests_drain_once_on_shortfall() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));

    stream.write(Some(Bytes::from_static(b"0123456789")), count_drains(&drained));
    device.request_write(4);
    stream.dispatch();
    assert_eq!(device.write_sizes(), vec![4]);
    assert_eq!(drained.get(), 0);
    assert_eq!(stream.pending_write(), Some((10, 4)));

    device.request_write(10);
    stream.dispatch();
    assert_eq!(device.write_sizes(), vec![4, 6]);
    assert_eq!(device.written(), b"0123456789");
    assert_eq!(drained.get(), 1);
    assert_eq!(stream.pending_write(), None);
}

#[test]
fn oversized_request_drains_immediately() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));

    stream.write(Some(Bytes::from_static(b"0123456789")), count_drains(&drained));
    device.request_write(20);
    stream.dispatch();

    assert_eq!(device.write_sizes(), vec![10]);
    assert_eq!(drained.get(), 1);
}

#[test]
fn exact_fit_drains_on_next_request() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));

    stream.write(Some(Bytes::from_static(b"abcd")), count_drains(&drained));
    device.request_write(4);
    stream.dispatch();
    assert_eq!(drained.get(), 0);

    device.request_write(4);
    stream.dispatch();
    assert_eq!(drained.get(), 1);
    assert_eq!(device.write_sizes(), vec![4]);

    // Nothing pending: further requests are no-ops.
    device.request_write(4);
    stream.dispatch();
    assert_eq!(drained.get(), 1);
}

#[test]
fn buffered_demand_is_served_on_submit() {
    let (_connection, mut stream, device) = playback();
    device.set_writable(6);

    stream.write(Some(Bytes::from_static(b"0123456789")), None);
    assert_eq!(device.write_sizes(), vec![6]);
    assert_eq!(stream.pending_write(), Some((10, 6)));
}

#[test]
fn pause_mid_buffer_flushes_and_drains_on_confirmation() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));

    stream.write(Some(Bytes::from_static(b"hello")), count_drains(&drained));
    device.request_write(2);
    stream.dispatch();
    assert_eq!(stream.pending_write(), Some((5, 2)));

    stream.write(None, None);
    assert_eq!(device.flush_requests(), 1);
    assert!(device.is_corked());
    assert_eq!(device.written(), b"hello");
    assert_eq!(drained.get(), 0);

    stream.dispatch();
    assert_eq!(drained.get(), 1);

    device.request_write(8);
    stream.dispatch();
    assert_eq!(stream.pending_write(), None);
    assert_eq!(device.written(), b"hello");
}

#[test]
fn pause_with_nothing_in_flight_fires_immediately() {
    let (_connection, mut stream, device) = playback();
    let paused = Rc::new(Cell::new(0));

    stream.write(None, count_drains(&paused));
    assert_eq!(paused.get(), 1);
    assert!(stream.is_corked());

    stream.write(Some(Bytes::new()), count_drains(&paused));
    assert_eq!(paused.get(), 2);
    assert!(stream.is_corked());
    assert_eq!(device.flush_requests(), 0);
}

#[test]
fn submit_uncorks_a_paused_stream() {
    let (_connection, mut stream, device) = playback();
    stream.write(None, None);
    assert!(device.is_corked());

    stream.write(Some(Bytes::from_static(b"data")), None);
    assert!(!device.is_corked());
}

#[test]
fn superseded_buffer_drains_after_flush() {
    let (_connection, mut stream, device) = playback();
    let log = Rc::new(RefCell::new(Vec::new()));

    stream.write(Some(Bytes::from_static(b"aaaaaa")), log_drain(&log, "a"));
    device.request_write(2);
    stream.dispatch();

    stream.write(Some(Bytes::from_static(b"bbbb")), log_drain(&log, "b"));
    assert_eq!(device.written(), b"aaaaaa");
    assert_eq!(device.flush_requests(), 1);
    assert!(stream.is_flushing());
    assert!(log.borrow().is_empty());

    stream.dispatch();
    assert_eq!(*log.borrow(), vec!["a"]);
    assert!(!stream.is_flushing());
    assert_eq!(stream.pending_write(), Some((4, 0)));

    device.request_write(8);
    stream.dispatch();
    assert_eq!(device.written(), b"aaaaaabbbb");
    assert_eq!(*log.borrow(), vec!["a", "b"]);
}

#[test]
fn submission_waits_for_outstanding_flush() {
    let (_connection, mut stream, device) = playback();
    let log = Rc::new(RefCell::new(Vec::new()));
    device.hold_flushes(true);

    stream.write(Some(Bytes::from_static(b"0123456789")), log_drain(&log, "first"));
    device.request_write(4);
    stream.dispatch();

    stream.write(Some(Bytes::from_static(b"abcdef")), log_drain(&log, "second"));
    assert_eq!(stream.pending_write(), None);
    assert!(stream.is_flushing());

    // Demand between flush request and confirmation sees no active buffer.
    device.request_write(4);
    stream.dispatch();
    assert_eq!(device.written(), b"0123456789");
    assert!(log.borrow().is_empty());

    assert_eq!(device.release_flushes(), 1);
    stream.dispatch();
    assert_eq!(*log.borrow(), vec!["first"]);
    // The unserved demand is picked up as soon as the queued buffer activates.
    assert_eq!(device.written(), b"0123456789abcd");
    assert_eq!(stream.pending_write(), Some((6, 4)));
}

#[test]
fn replaced_queued_buffer_is_flushed_whole() {
    let (_connection, mut stream, device) = playback();
    let log = Rc::new(RefCell::new(Vec::new()));
    device.hold_flushes(true);

    stream.write(Some(Bytes::from_static(b"aaaa")), log_drain(&log, "a"));
    device.request_write(1);
    stream.dispatch();
    stream.write(Some(Bytes::from_static(b"bbbb")), log_drain(&log, "b"));
    stream.write(Some(Bytes::from_static(b"cccc")), log_drain(&log, "c"));

    assert_eq!(device.written(), b"aaaabbbb");
    assert_eq!(device.flush_requests(), 2);

    device.release_flushes();
    stream.dispatch();
    assert_eq!(*log.borrow(), vec!["a", "b"]);
    assert_eq!(stream.pending_write(), Some((4, 0)));

    device.request_write(16);
    stream.dispatch();
    assert_eq!(device.written(), b"aaaabbbbcccc");
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn pause_during_flush_fires_after_superseded_buffer() {
    let (_connection, mut stream, device) = playback();
    let log = Rc::new(RefCell::new(Vec::new()));
    device.hold_flushes(true);

    stream.write(Some(Bytes::from_static(b"abcdef")), log_drain(&log, "buffer"));
    device.request_write(2);
    stream.dispatch();
    stream.write(None, log_drain(&log, "pause"));
    assert!(log.borrow().is_empty());

    device.release_flushes();
    stream.dispatch();
    assert_eq!(*log.borrow(), vec!["buffer", "pause"]);
}

#[test]
fn drain_callback_can_submit_next_buffer() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));
    let next = count_drains(&drained);

    stream.write(
        Some(Bytes::from_static(b"abcd")),
        Some(Box::new(move |stream: &mut Stream| {
            stream.write(Some(Bytes::from_static(b"efgh")), next);
            Ok(())
        })),
    );
    device.request_write(8);
    stream.dispatch();

    assert_eq!(device.written(), b"abcdefgh");
    assert_eq!(stream.pending_write(), Some((4, 4)));
    assert_eq!(drained.get(), 0);
}

#[test]
fn failing_drain_callback_is_counted() {
    let (_connection, mut stream, device) = playback();

    stream.write(
        Some(Bytes::from_static(b"abcd")),
        Some(Box::new(|_: &mut Stream| Err("sink closed".into()))),
    );
    device.request_write(8);
    stream.dispatch();

    assert_eq!(stream.callback_failures(), 1);
    assert_eq!(stream.pending_write(), None);
}

#[test]
fn rejected_write_keeps_cursor_and_defers_drain() {
    let (_connection, mut stream, device) = playback();
    let drained = Rc::new(Cell::new(0));

    // Terminated at the device but not yet dispatched: writes fail.
    device.set_writable(8);
    device.set_state(StreamState::Terminated);
    stream.write(Some(Bytes::from_static(b"abcd")), count_drains(&drained));
    assert_eq!(stream.pending_write(), Some((4, 0)));
    assert_eq!(drained.get(), 0);
    assert!(device.written().is_empty());

    // The terminal state abandons the buffer without firing its callback.
    stream.dispatch();
    assert_eq!(stream.pending_write(), None);
    assert_eq!(drained.get(), 0);
}

#[test]
fn write_requests_ignored_for_record_streams() {
    let (_connection, mut stream, device) = record();
    stream.write(Some(Bytes::from_static(b"abcd")), None);
    device.request_write(4);
    stream.dispatch();
    assert!(device.written().is_empty());
}

#[test]
fn upload_streams_take_writes() {
    let options = StreamOptions::default().with_latency_usec(50_000);
    let (_connection, mut stream, device) = open(options, Direction::Upload, StreamFlags::NONE);
    assert_eq!(device.requested_attr(), Some(BufferAttr::default()));

    stream.write(Some(Bytes::from_static(b"sample")), None);
    device.request_write(16);
    stream.dispatch();
    assert_eq!(device.written(), b"sample");
}

#[test]
fn underflows_are_counted() {
    let (_connection, mut stream, device) = playback();
    device.underflow();
    device.underflow();
    stream.dispatch();
    assert_eq!(stream.underflow_count(), 2);
}

// ---------------------------------------------------------------------------
// Read gate
// ---------------------------------------------------------------------------

#[test]
fn armed_gate_delivers_exact_chunk_and_acknowledges_on_error() {
    let (_connection, mut stream, device) = record();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    stream.read(Some(Box::new(move |_: &mut Stream, chunk: Bytes| {
        sink.borrow_mut().push(chunk);
        Err("consumer failed".into())
    })));
    assert!(device.push_capture(&[1, 2, 3, 4, 5, 6, 7, 8]));
    stream.dispatch();

    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(device.acknowledged(), 1);
    assert_eq!(device.buffered_chunks(), 0);
    assert_eq!(stream.callback_failures(), 1);
    assert!(stream.is_reading());
}

#[test]
fn unarmed_gate_discards_chunks() {
    let (_connection, mut stream, device) = record();
    device.push_capture(&[9; 16]);
    stream.dispatch();
    assert_eq!(device.acknowledged(), 1);
    assert_eq!(device.buffered_chunks(), 0);
}

#[test]
fn disarm_corks_and_is_idempotent() {
    let (_connection, mut stream, device) = record();
    let chunks = Rc::new(RefCell::new(Vec::new()));

    stream.read(collect_chunks(&chunks));
    assert!(!device.is_corked());

    stream.read(None);
    stream.read(None);
    assert!(device.is_corked());
    assert!(!stream.is_reading());
    assert!(!device.push_capture(&[1, 2]));
    stream.dispatch();
    assert!(chunks.borrow().is_empty());
}

#[test]
fn rearm_skips_chunks_from_disarmed_interval() {
    let (_connection, mut stream, device) = record();
    let chunks = Rc::new(RefCell::new(Vec::new()));

    stream.read(collect_chunks(&chunks));
    // Buffered but not yet dispatched when the gate closes.
    assert!(device.push_capture(&[1, 1]));
    stream.read(None);
    assert_eq!(device.acknowledged(), 1);

    assert!(!device.push_capture(&[2, 2]));
    device.push_event(TransportEvent::ReadReady(2));

    stream.read(collect_chunks(&chunks));
    stream.dispatch();
    assert!(chunks.borrow().is_empty());
    assert_eq!(device.acknowledged(), 1);
    assert_eq!(device.buffered_chunks(), 0);

    assert!(device.push_capture(&[3, 3]));
    stream.dispatch();
    assert_eq!(*chunks.borrow(), vec![Bytes::from_static(&[3, 3])]);
    assert_eq!(device.acknowledged(), 2);
}

#[test]
fn rearm_replaces_callback() {
    let (_connection, mut stream, device) = record();
    let first = Rc::new(RefCell::new(Vec::new()));
    let second = Rc::new(RefCell::new(Vec::new()));

    stream.read(collect_chunks(&first));
    stream.read(None);
    stream.read(collect_chunks(&second));

    device.push_capture(&[7, 7]);
    stream.dispatch();
    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 1);
}

#[test]
fn arming_drops_stale_chunk() {
    let (_connection, mut stream, device) = record();
    device.push_capture(&[1; 4]);
    let chunks = Rc::new(RefCell::new(Vec::new()));

    stream.read(collect_chunks(&chunks));
    assert_eq!(device.buffered_chunks(), 0);
    assert_eq!(device.acknowledged(), 1);

    // The stale notification finds nothing to peek.
    stream.dispatch();
    assert!(chunks.borrow().is_empty());
}

#[test]
fn disarm_from_inside_delivery_sticks() {
    let (_connection, mut stream, device) = record();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);

    stream.read(Some(Box::new(move |stream: &mut Stream, _chunk: Bytes| {
        counter.set(counter.get() + 1);
        stream.read(None);
        Ok(())
    })));
    device.push_capture(&[1; 4]);
    stream.dispatch();

    assert_eq!(calls.get(), 1);
    assert!(!stream.is_reading());
    assert!(device.is_corked());
}

#[test]
fn rearm_from_inside_delivery_keeps_new_callback() {
    let (_connection, mut stream, device) = record();
    let replacement = Rc::new(RefCell::new(Vec::new()));
    let next = RefCell::new(collect_chunks(&replacement));

    stream.read(Some(Box::new(move |stream: &mut Stream, _chunk: Bytes| {
        if let Some(callback) = next.borrow_mut().take() {
            stream.read(Some(callback));
        }
        Ok(())
    })));
    device.push_capture(&[1; 4]);
    stream.dispatch();
    device.push_capture(&[2; 4]);
    stream.dispatch();

    assert_eq!(replacement.borrow().len(), 1);
    assert_eq!(replacement.borrow()[0].as_ref(), &[2; 4]);
}

#[test]
fn playback_streams_reclaim_read_notifications() {
    let (_connection, mut stream, device) = playback();
    let chunks = Rc::new(RefCell::new(Vec::new()));
    stream.read(collect_chunks(&chunks));

    device.push_capture(&[3; 4]);
    stream.dispatch();
    assert!(chunks.borrow().is_empty());
    assert_eq!(device.acknowledged(), 1);
}

#[test]
fn start_corked_record_waits_for_arm() {
    let (_connection, mut stream, device) =
        open(StreamOptions::default(), Direction::Record, StreamFlags::START_CORKED);
    assert!(stream.is_corked());
    assert!(!device.push_capture(&[1; 4]));

    let chunks = Rc::new(RefCell::new(Vec::new()));
    stream.read(collect_chunks(&chunks));
    assert!(device.push_capture(&[1; 4]));
    stream.dispatch();
    assert_eq!(chunks.borrow().len(), 1);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn construction_validates_and_announces() {
    let connection = Rc::new(SimulatedConnection::new());
    let options = StreamOptions::default()
        .with_name("music")
        .with_format(SampleFormat::F32Le)
        .with_rate(48000)
        .with_channels(1);
    let stream = Stream::new(connection.clone(), options).unwrap();
    let device = connection.last_handle().unwrap();

    assert_eq!(stream.state(), StreamState::Unconnected);
    assert_eq!(stream.direction(), Direction::Unset);
    assert_eq!(device.name(), "music");
    assert_eq!(device.sample_spec().format, SampleFormat::F32Le);
    assert_eq!(stream.sample_spec().frame_size(), 4);
}

#[test]
fn defaults_match_stream_options() {
    let connection = Rc::new(SimulatedConnection::new());
    let stream = Stream::new(connection, StreamOptions::default()).unwrap();
    assert_eq!(stream.name(), "flowstream");
    assert_eq!(stream.sample_spec().format, SampleFormat::S16Le);
    assert_eq!(stream.sample_spec().rate, 44100);
    assert_eq!(stream.sample_spec().channels, 2);
    assert_eq!(stream.requested_latency_usec(), 0);
}

#[test]
fn refused_handle_fails_construction() {
    let connection = Rc::new(SimulatedConnection::new());
    connection.refuse_streams(Some("too many streams"));
    let result = Stream::new(connection, StreamOptions::default());
    assert!(matches!(result, Err(Error::Create(TransportError::Refused(_)))));
}

#[test]
fn invalid_sample_spec_rejected() {
    let connection = Rc::new(SimulatedConnection::new());
    let result = Stream::new(connection.clone(), StreamOptions::default().with_rate(0));
    assert!(matches!(result, Err(Error::InvalidSampleSpec(_))));
    let result = Stream::new(connection.clone(), StreamOptions::default().with_channels(0));
    assert!(matches!(result, Err(Error::InvalidSampleSpec(_))));
    assert!(connection.handles().is_empty());
}

#[test]
fn connect_notifies_creating_then_ready() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    let device = connection.last_handle().unwrap();
    device.set_auto_ready(false);
    let states = StateLog::default();
    stream.set_state_listener(record_states(&states));

    stream.connect(Some("speakers"), Direction::Playback, StreamFlags::ADJUST_LATENCY).unwrap();
    assert_eq!(stream.state(), StreamState::Creating);
    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Creating);

    device.set_state(StreamState::Ready);
    stream.dispatch();
    assert_eq!(
        *states.borrow(),
        vec![(StreamState::Creating, None), (StreamState::Ready, None)]
    );
    assert_eq!(device.device_name().as_deref(), Some("speakers"));
    assert_eq!(device.connect_flags(), Some(StreamFlags::ADJUST_LATENCY));
}

#[test]
fn connect_requires_direction() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection, StreamOptions::default()).unwrap();
    let result = stream.connect(None, Direction::Unset, StreamFlags::NONE);
    assert!(matches!(result, Err(Error::InvalidDirection)));
    assert_eq!(stream.state(), StreamState::Unconnected);
}

#[test]
fn connect_twice_is_invalid() {
    let (_connection, mut stream, _device) = playback();
    let result = stream.connect(None, Direction::Playback, StreamFlags::NONE);
    assert!(matches!(result, Err(Error::InvalidState(StreamState::Ready))));
}

#[test]
fn rejected_connect_leaves_stream_unconnected() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    connection.last_handle().unwrap().reject_connect(Some("no such sink"));

    let result = stream.connect(Some("missing"), Direction::Playback, StreamFlags::NONE);
    assert!(matches!(result, Err(Error::Connect(TransportError::Rejected(_)))));
    assert_eq!(stream.state(), StreamState::Unconnected);
}

#[test]
fn latency_target_shapes_buffer_attributes() {
    let options = StreamOptions::default().with_rate(48000).with_latency_usec(20_000);
    let (_connection, stream, device) = open(options.clone(), Direction::Playback, StreamFlags::NONE);
    let requested = device.requested_attr().unwrap();
    assert_eq!(requested.target_length, Some(3840));
    assert_eq!(requested.fragment_size, None);
    // The transport's answer replaces the request.
    assert_eq!(stream.buffer_attr(), &device.effective_attr());

    let (_connection, _stream, device) = open(options, Direction::Record, StreamFlags::NONE);
    let requested = device.requested_attr().unwrap();
    assert_eq!(requested.fragment_size, Some(3840));
    assert_eq!(requested.target_length, None);
}

#[test]
fn invalid_transitions_are_ignored() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    let device = connection.last_handle().unwrap();

    device.push_event(TransportEvent::StateChanged(StreamState::Ready));
    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Unconnected);

    stream.connect(None, Direction::Playback, StreamFlags::NONE).unwrap();
    stream.dispatch();
    device.set_state(StreamState::Terminated);
    stream.dispatch();
    device.push_event(TransportEvent::StateChanged(StreamState::Ready));
    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Terminated);
}

#[test]
fn failure_reports_connection_error() {
    let (connection, mut stream, device) = playback();
    let states = StateLog::default();
    stream.set_state_listener(record_states(&states));
    let drained = Rc::new(Cell::new(0));
    let chunks = Rc::new(RefCell::new(Vec::new()));

    stream.write(Some(Bytes::from_static(b"abcd")), count_drains(&drained));
    stream.read(collect_chunks(&chunks));
    connection.set_error("connection reset by server");
    device.set_state(StreamState::Failed);
    device.request_write(8);
    stream.dispatch();

    assert_eq!(stream.state(), StreamState::Failed);
    assert_eq!(
        *states.borrow(),
        vec![(
            StreamState::Failed,
            Some("stream failed: connection reset by server".to_string())
        )]
    );
    assert_eq!(drained.get(), 0);
    assert!(!stream.is_reading());
    assert!(device.written().is_empty());
}

#[test]
fn failing_listener_is_counted() {
    let (_connection, mut stream, _device) = playback();
    stream.set_state_listener(Some(Box::new(|_: StreamState, _: Option<&Error>| Err("listener broke".into()))));
    stream.disconnect();
    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Terminated);
    assert_eq!(stream.callback_failures(), 1);
}

#[test]
fn disconnect_is_idempotent_and_terminal() {
    let (_connection, mut stream, device) = record();
    let chunks = Rc::new(RefCell::new(Vec::new()));
    stream.read(collect_chunks(&chunks));

    stream.disconnect();
    stream.disconnect();
    assert_eq!(device.disconnects(), 1);

    stream.dispatch();
    assert_eq!(stream.state(), StreamState::Terminated);
    assert!(!stream.is_reading());

    let result = stream.connect(None, Direction::Record, StreamFlags::NONE);
    assert!(matches!(result, Err(Error::InvalidState(StreamState::Terminated))));
}

#[test]
fn data_after_disconnect_request_is_not_delivered() {
    let (_connection, mut stream, device) = record();
    let chunks = Rc::new(RefCell::new(Vec::new()));
    stream.read(collect_chunks(&chunks));

    device.push_capture(&[5; 4]);
    stream.disconnect();
    stream.dispatch();

    assert!(chunks.borrow().is_empty());
    assert_eq!(device.acknowledged(), 1);
}

#[test]
fn drop_disconnects_and_releases() {
    let (_connection, stream, device) = playback();
    drop(stream);
    assert_eq!(device.disconnects(), 1);
    assert!(device.is_released());
}

#[test]
fn drop_after_disconnect_does_not_repeat() {
    let (_connection, mut stream, device) = playback();
    stream.disconnect();
    drop(stream);
    assert_eq!(device.disconnects(), 1);
}

#[test]
fn drop_unconnected_only_releases() {
    let connection = Rc::new(SimulatedConnection::new());
    let stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    let device = connection.last_handle().unwrap();
    drop(stream);
    assert_eq!(device.disconnects(), 0);
    assert!(device.is_released());
}

#[test]
fn latency_query_and_notification() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    assert!(matches!(stream.latency(), Err(Error::Latency(TransportError::NoData))));

    stream.connect(None, Direction::Playback, StreamFlags::NONE).unwrap();
    stream.dispatch();
    let device = connection.last_handle().unwrap();
    device.set_latency(Some(Latency::new(12_500)));
    stream.dispatch();

    assert_eq!(stream.latency().unwrap(), Latency::new(12_500));
    assert_eq!(stream.last_latency(), Some(Latency::new(12_500)));
}

#[test]
fn latency_notification_before_ready_is_ignored() {
    let connection = Rc::new(SimulatedConnection::new());
    let mut stream = Stream::new(connection.clone(), StreamOptions::default()).unwrap();
    connection.last_handle().unwrap().push_event(TransportEvent::LatencyChanged);
    stream.dispatch();
    assert_eq!(stream.last_latency(), None);
}

// ---------------------------------------------------------------------------
// Clocked transport
// ---------------------------------------------------------------------------

#[test]
fn clocked_playback_plays_whole_buffer() {
    let options = StreamOptions::default().with_rate(48000).with_latency_usec(20_000);
    let (connection, mut stream, device) = open(options, Direction::Playback, StreamFlags::NONE);
    let drained = Rc::new(Cell::new(0));
    // 100ms of 48kHz stereo s16
    let pcm: Vec<u8> = (0..19_200u32).map(|i| (i % 251) as u8).collect();

    stream.write(Some(Bytes::from(pcm.clone())), count_drains(&drained));
    for _ in 0..40 {
        connection.iterate(Duration::from_millis(5));
        stream.dispatch();
    }

    assert_eq!(drained.get(), 1);
    assert_eq!(device.written(), pcm);
    assert_eq!(device.played_bytes(), pcm.len());
    assert_eq!(stream.underflow_count(), 1);
    assert!(device.write_sizes().iter().all(|&size| size <= 3840));
}

#[test]
fn clocked_record_delivers_fragments() {
    let options = StreamOptions::default().with_rate(48000).with_latency_usec(10_000);
    let (connection, mut stream, _device) = open(options, Direction::Record, StreamFlags::NONE);
    let chunks = Rc::new(RefCell::new(Vec::new()));
    stream.read(collect_chunks(&chunks));

    connection.iterate(Duration::from_millis(25));
    stream.dispatch();

    let chunks = chunks.borrow();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.len() == 1920 && c.iter().all(|&b| b == 0)));
}
