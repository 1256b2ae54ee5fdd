//! The audio node graph.
//!
//! Nodes live in a generational arena so that a [`NodeId`] for a removed
//! node never aliases a newer one. Operations on stale ids fail with
//! [`GraphError::UnknownNode`]; callers on the playback paths discard those
//! errors, which turns every late teardown step into a silent no-op.
//!
//! Rendering walks the nodes in a precomputed order, one stereo frame at a
//! time. Delay lines are the only nodes allowed to close a cycle: their
//! output for the current frame comes from their buffer, so feedback loops
//! through a delay resolve without recursion.

use super::param::AudioParam;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::TAU;
use thiserror::Error;

/// One stereo frame (left, right).
pub type Frame = [f32; 2];

/// Work to run on the render thread once the audio clock reaches a time.
pub type GraphCallback = Box<dyn FnOnce(&mut AudioGraph) + Send>;

/// Errors raised by graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The node was removed (or never existed).
    #[error("unknown or disposed audio node {0:?}")]
    UnknownNode(NodeId),
    /// The node exists but is not of the kind the operation needs.
    #[error("audio node {0:?} is not a {1}")]
    NotA(NodeId, &'static str),
}

/// Handle to a node in an [`AudioGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Where a node sends its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Another node's input.
    Node(NodeId),
    /// The hardware output.
    Destination,
}

impl From<NodeId> for Output {
    fn from(id: NodeId) -> Self {
        Output::Node(id)
    }
}

/// Oscillator wave shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    #[default]
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// Samples the waveform at a phase in `[0, 1)`.
    fn sample(self, phase: f64) -> f32 {
        let value = match self {
            Waveform::Sine => (phase * TAU).sin(),
            // Starts at zero and rises, like the sine
            Waveform::Triangle => 1.0 - 2.0 * (2.0 * ((phase + 0.25) % 1.0) - 1.0).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * ((phase + 0.5) % 1.0) - 1.0,
        };
        value as f32
    }
}

struct Oscillator {
    waveform: Waveform,
    frequency: AudioParam,
    phase: f64,
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

impl Oscillator {
    fn process(&mut self, time: f64, sample_rate: f64) -> Frame {
        let running = self.start_time.is_some_and(|start| time >= start)
            && self.stop_time.map_or(true, |stop| time < stop);
        if !running {
            return [0.0; 2];
        }

        let value = self.waveform.sample(self.phase);
        let frequency = f64::from(self.frequency.value_at(time));
        self.phase = (self.phase + frequency / sample_rate).rem_euclid(1.0);
        [value, value]
    }
}

struct DelayLine {
    buffer: Vec<Frame>,
    position: usize,
}

impl DelayLine {
    fn read(&self) -> Frame {
        self.buffer[self.position]
    }

    fn write(&mut self, frame: Frame) {
        self.buffer[self.position] = frame;
        self.position = (self.position + 1) % self.buffer.len();
    }
}

/// A streaming sample source (interleaved stereo f32).
struct TrackSource {
    samples: Box<dyn Iterator<Item = f32> + Send>,
    paused: bool,
    started: bool,
    finished: bool,
    on_started: Option<GraphCallback>,
    on_ended: Option<GraphCallback>,
}

impl TrackSource {
    fn process(&mut self) -> (Frame, Option<TrackEvent>) {
        if self.paused || self.finished {
            return ([0.0; 2], None);
        }

        match self.samples.next() {
            Some(left) => {
                let right = self.samples.next().unwrap_or(left);
                let event = if self.started {
                    None
                } else {
                    self.started = true;
                    Some(TrackEvent::Started)
                };
                ([left, right], event)
            }
            None => {
                self.finished = true;
                ([0.0; 2], Some(TrackEvent::Ended))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackEvent {
    Started,
    Ended,
}

enum NodeKind {
    Oscillator(Oscillator),
    Gain(AudioParam),
    Delay(DelayLine),
    Track(TrackSource),
}

struct NodeEntry {
    kind: NodeKind,
    outputs: Vec<Output>,
}

struct NodeSlot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// A pending callback on the audio clock.
struct Timer {
    at: f64,
    callback: GraphCallback,
}

/// An arena of audio nodes plus the audio clock that drives them.
pub struct AudioGraph {
    sample_rate: u32,
    /// Frames rendered so far; the audio clock.
    frames_rendered: u64,
    slots: Vec<NodeSlot>,
    free: Vec<u32>,
    /// Render order; rebuilt when the topology changes.
    order: Vec<u32>,
    delays: Vec<u32>,
    order_dirty: bool,
    /// Per-slot input accumulators for the current frame.
    inputs: Vec<Frame>,
    timers: Vec<Timer>,
    track_events: Vec<(NodeId, TrackEvent)>,
}

impl AudioGraph {
    /// Creates an empty graph running at `sample_rate` frames per second.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            delays: Vec::new(),
            order_dirty: false,
            inputs: Vec::new(),
            timers: Vec::new(),
            track_events: Vec::new(),
        }
    }

    /// Frames per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio-clock time in seconds: frames rendered so far over the sample rate.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / f64::from(self.sample_rate)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    /// Number of callbacks waiting for the audio clock.
    pub fn pending_callbacks(&self) -> usize {
        self.timers.len()
    }

    /// Returns true if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_ok()
    }

    /// Creates an oscillator. It stays silent until [`AudioGraph::start`].
    pub fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> NodeId {
        self.insert(NodeKind::Oscillator(Oscillator {
            waveform,
            frequency: AudioParam::new(frequency),
            phase: 0.0,
            start_time: None,
            stop_time: None,
        }))
    }

    /// Creates a gain node.
    pub fn create_gain(&mut self, gain: f32) -> NodeId {
        self.insert(NodeKind::Gain(AudioParam::new(gain)))
    }

    /// Creates a fixed delay line of `delay_secs` (at least one frame).
    pub fn create_delay(&mut self, delay_secs: f64) -> NodeId {
        let frames = (delay_secs * f64::from(self.sample_rate)).round().max(1.0) as usize;
        self.insert(NodeKind::Delay(DelayLine {
            buffer: vec![[0.0; 2]; frames],
            position: 0,
        }))
    }

    /// Creates a source that pulls interleaved stereo samples from `samples`.
    pub fn create_track(&mut self, samples: Box<dyn Iterator<Item = f32> + Send>) -> NodeId {
        self.insert(NodeKind::Track(TrackSource {
            samples,
            paused: false,
            started: false,
            finished: false,
            on_started: None,
            on_ended: None,
        }))
    }

    /// Routes `from`'s output into `to`. Connecting twice is a no-op.
    pub fn connect(&mut self, from: NodeId, to: impl Into<Output>) -> Result<(), GraphError> {
        let to = to.into();
        if let Output::Node(target) = to {
            self.entry(target)?;
        }
        let entry = self.entry_mut(from)?;
        if !entry.outputs.contains(&to) {
            entry.outputs.push(to);
        }
        self.order_dirty = true;
        Ok(())
    }

    /// Removes every outgoing connection of `id`.
    pub fn disconnect(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.entry_mut(id)?.outputs.clear();
        self.order_dirty = true;
        Ok(())
    }

    /// Removes a node and every connection into it.
    pub fn remove(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.entry(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        let target = Output::Node(id);
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            entry.outputs.retain(|output| *output != target);
        }
        self.order_dirty = true;
        Ok(())
    }

    /// Starts an oscillator at audio-clock time `at`.
    pub fn start(&mut self, id: NodeId, at: f64) -> Result<(), GraphError> {
        match &mut self.entry_mut(id)?.kind {
            NodeKind::Oscillator(osc) => {
                osc.start_time = Some(at);
                Ok(())
            }
            _ => Err(GraphError::NotA(id, "oscillator")),
        }
    }

    /// Stops an oscillator at audio-clock time `at`.
    pub fn stop(&mut self, id: NodeId, at: f64) -> Result<(), GraphError> {
        match &mut self.entry_mut(id)?.kind {
            NodeKind::Oscillator(osc) => {
                osc.stop_time = Some(at);
                Ok(())
            }
            _ => Err(GraphError::NotA(id, "oscillator")),
        }
    }

    /// The gain param of a gain node.
    pub fn gain_mut(&mut self, id: NodeId) -> Result<&mut AudioParam, GraphError> {
        match &mut self.entry_mut(id)?.kind {
            NodeKind::Gain(gain) => Ok(gain),
            _ => Err(GraphError::NotA(id, "gain")),
        }
    }

    /// The frequency param of an oscillator.
    pub fn frequency_mut(&mut self, id: NodeId) -> Result<&mut AudioParam, GraphError> {
        match &mut self.entry_mut(id)?.kind {
            NodeKind::Oscillator(osc) => Ok(&mut osc.frequency),
            _ => Err(GraphError::NotA(id, "oscillator")),
        }
    }

    /// Gain of a gain node at audio-clock time `at`.
    pub fn gain_at(&self, id: NodeId, at: f64) -> Result<f32, GraphError> {
        match &self.entry(id)?.kind {
            NodeKind::Gain(gain) => Ok(gain.value_at(at)),
            _ => Err(GraphError::NotA(id, "gain")),
        }
    }

    /// Frequency of an oscillator at audio-clock time `at`.
    pub fn frequency_at(&self, id: NodeId, at: f64) -> Result<f32, GraphError> {
        match &self.entry(id)?.kind {
            NodeKind::Oscillator(osc) => Ok(osc.frequency.value_at(at)),
            _ => Err(GraphError::NotA(id, "oscillator")),
        }
    }

    /// Pauses a track source; it outputs silence from the next frame on.
    pub fn pause(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.track_mut(id)?.paused = true;
        Ok(())
    }

    /// Installs (or with `None`, detaches) the callback fired when a track
    /// source yields its first frame.
    pub fn set_on_started(
        &mut self,
        id: NodeId,
        callback: Option<GraphCallback>,
    ) -> Result<(), GraphError> {
        self.track_mut(id)?.on_started = callback;
        Ok(())
    }

    /// Installs (or with `None`, detaches) the callback fired when a track
    /// source runs out of samples.
    pub fn set_on_ended(
        &mut self,
        id: NodeId,
        callback: Option<GraphCallback>,
    ) -> Result<(), GraphError> {
        self.track_mut(id)?.on_ended = callback;
        Ok(())
    }

    /// Runs `callback` on the render thread once the audio clock reaches `at`.
    ///
    /// Callbacks run between render blocks, so they fire at most one block
    /// late; a time already in the past fires after the next block.
    pub fn schedule_callback(&mut self, at: f64, callback: GraphCallback) {
        self.timers.push(Timer { at, callback });
    }

    /// Renders `left.len()` frames (both slices must have equal length) and
    /// advances the audio clock.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());

        self.run_due_callbacks();
        if self.order_dirty {
            self.rebuild_order();
        }
        let now = self.current_time();
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            match &mut entry.kind {
                NodeKind::Gain(gain) => gain.prune(now),
                NodeKind::Oscillator(osc) => osc.frequency.prune(now),
                _ => {}
            }
        }

        for i in 0..frames {
            let frame = self.render_frame();
            left[i] = frame[0].clamp(-1.0, 1.0);
            right[i] = frame[1].clamp(-1.0, 1.0);
            self.frames_rendered += 1;
        }

        self.fire_track_events();
        self.run_due_callbacks();
    }

    fn render_frame(&mut self) -> Frame {
        let sample_rate = f64::from(self.sample_rate);
        let time = self.frames_rendered as f64 / sample_rate;
        let mut mix = [0.0f32; 2];

        let AudioGraph {
            slots,
            order,
            delays,
            inputs,
            track_events,
            ..
        } = self;

        inputs.iter_mut().for_each(|input| *input = [0.0; 2]);

        for &index in order.iter() {
            let slot = &mut slots[index as usize];
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            let input = inputs[index as usize];

            let output = match &mut entry.kind {
                NodeKind::Oscillator(osc) => osc.process(time, sample_rate),
                NodeKind::Gain(gain) => {
                    let level = gain.value_at(time);
                    [input[0] * level, input[1] * level]
                }
                NodeKind::Delay(delay) => delay.read(),
                NodeKind::Track(track) => {
                    let (frame, event) = track.process();
                    if let Some(event) = event {
                        track_events.push((
                            NodeId {
                                index,
                                generation: slot.generation,
                            },
                            event,
                        ));
                    }
                    frame
                }
            };

            for target in &entry.outputs {
                let sink = match target {
                    Output::Destination => &mut mix,
                    Output::Node(id) => &mut inputs[id.index as usize],
                };
                sink[0] += output[0];
                sink[1] += output[1];
            }
        }

        for &index in delays.iter() {
            if let Some(NodeEntry {
                kind: NodeKind::Delay(delay),
                ..
            }) = slots[index as usize].entry.as_mut()
            {
                delay.write(inputs[index as usize]);
            }
        }

        mix
    }

    /// Topologically orders live nodes, ignoring edges into delay lines.
    fn rebuild_order(&mut self) {
        let count = self.slots.len();
        let mut indegree = vec![0usize; count];
        let is_delay = |slot: &NodeSlot| {
            matches!(
                slot.entry,
                Some(NodeEntry {
                    kind: NodeKind::Delay(_),
                    ..
                })
            )
        };

        for entry in self.slots.iter().filter_map(|slot| slot.entry.as_ref()) {
            for output in &entry.outputs {
                if let Output::Node(id) = output {
                    if !is_delay(&self.slots[id.index as usize]) {
                        indegree[id.index as usize] += 1;
                    }
                }
            }
        }

        let mut ready: VecDeque<u32> = (0..count as u32)
            .filter(|&i| self.slots[i as usize].entry.is_some() && indegree[i as usize] == 0)
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(index) = ready.pop_front() {
            order.push(index);
            if let Some(entry) = self.slots[index as usize].entry.as_ref() {
                for output in &entry.outputs {
                    if let Output::Node(id) = output {
                        let target = id.index as usize;
                        if is_delay(&self.slots[target]) {
                            continue;
                        }
                        indegree[target] -= 1;
                        if indegree[target] == 0 {
                            ready.push_back(id.index);
                        }
                    }
                }
            }
        }

        let live = self.node_count();
        if order.len() < live {
            tracing::warn!(
                skipped = live - order.len(),
                "Audio graph has a cycle without a delay; affected nodes are muted"
            );
        }

        self.delays = order
            .iter()
            .copied()
            .filter(|&i| is_delay(&self.slots[i as usize]))
            .collect();
        self.order = order;
        self.inputs = vec![[0.0; 2]; count];
        self.order_dirty = false;
    }

    fn fire_track_events(&mut self) {
        let events = std::mem::take(&mut self.track_events);
        for (id, event) in events {
            let callback = match self.track_mut(id) {
                Ok(track) => match event {
                    TrackEvent::Started => track.on_started.take(),
                    TrackEvent::Ended => track.on_ended.take(),
                },
                Err(_) => None,
            };
            if let Some(callback) = callback {
                callback(self);
            }
        }
    }

    fn run_due_callbacks(&mut self) {
        let now = self.current_time();
        loop {
            let due = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.at <= now)
                .min_by(|(_, a), (_, b)| a.at.total_cmp(&b.at))
                .map(|(index, _)| index);
            let Some(index) = due else {
                break;
            };
            let timer = self.timers.swap_remove(index);
            (timer.callback)(self);
        }
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let entry = NodeEntry {
            kind,
            outputs: Vec::new(),
        };
        self.order_dirty = true;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(NodeSlot {
                generation: 0,
                entry: Some(entry),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry, GraphError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry, GraphError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn track_mut(&mut self, id: NodeId) -> Result<&mut TrackSource, GraphError> {
        match &mut self.entry_mut(id)?.kind {
            NodeKind::Track(track) => Ok(track),
            _ => Err(GraphError::NotA(id, "track source")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const RATE: u32 = 1000;

    fn render(graph: &mut AudioGraph, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        graph.render(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_clock_advances_with_rendering() {
        let mut graph = AudioGraph::new(RATE);
        assert_eq!(graph.current_time(), 0.0);
        render(&mut graph, 500);
        assert!((graph.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_gain_scales_track_source() {
        let mut graph = AudioGraph::new(RATE);
        let track = graph.create_track(Box::new(std::iter::repeat(0.5)));
        let gain = graph.create_gain(0.5);
        graph.connect(track, gain).unwrap();
        graph.connect(gain, Output::Destination).unwrap();

        let (left, right) = render(&mut graph, 4);
        assert!(left.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert!(right.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_oscillator_silent_until_started() {
        let mut graph = AudioGraph::new(RATE);
        let osc = graph.create_oscillator(Waveform::Square, 10.0);
        graph.connect(osc, Output::Destination).unwrap();

        let (left, _) = render(&mut graph, 10);
        assert!(left.iter().all(|&s| s == 0.0));

        graph.start(osc, 0.0).unwrap();
        let (left, _) = render(&mut graph, 10);
        assert!(left.iter().any(|&s| s != 0.0));

        let now = graph.current_time();
        graph.stop(osc, now).unwrap();
        let (left, _) = render(&mut graph, 10);
        assert!(left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_delay_feedback_loop_renders() {
        let mut graph = AudioGraph::new(RATE);
        // One impulse, then silence
        let source = graph.create_track(Box::new([1.0f32, 1.0].into_iter()));
        let delay = graph.create_delay(0.01); // 10 frames
        let feedback = graph.create_gain(0.5);
        graph.connect(source, delay).unwrap();
        graph.connect(delay, feedback).unwrap();
        graph.connect(feedback, delay).unwrap();
        graph.connect(delay, Output::Destination).unwrap();

        let (left, _) = render(&mut graph, 25);
        assert!((left[10] - 1.0).abs() < 1e-6);
        assert!((left[20] - 0.5).abs() < 1e-6);
        assert_eq!(left[15], 0.0);
    }

    #[test]
    fn test_remove_makes_id_stale() {
        let mut graph = AudioGraph::new(RATE);
        let gain = graph.create_gain(1.0);
        graph.remove(gain).unwrap();

        assert!(!graph.contains(gain));
        assert_eq!(graph.remove(gain), Err(GraphError::UnknownNode(gain)));
        assert!(graph.gain_mut(gain).is_err());

        // Slot reuse must not revive the old id
        let other = graph.create_gain(1.0);
        assert_ne!(gain, other);
        assert!(!graph.contains(gain));
    }

    #[test]
    fn test_remove_drops_incoming_edges() {
        let mut graph = AudioGraph::new(RATE);
        let track = graph.create_track(Box::new(std::iter::repeat(1.0)));
        let gain = graph.create_gain(1.0);
        graph.connect(track, gain).unwrap();
        graph.connect(gain, Output::Destination).unwrap();
        graph.remove(gain).unwrap();

        let (left, _) = render(&mut graph, 4);
        assert!(left.iter().all(|&s| s == 0.0));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_scheduled_callback_fires_on_audio_clock() {
        let mut graph = AudioGraph::new(RATE);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        graph.schedule_callback(
            0.1,
            Box::new(move |_| {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        render(&mut graph, 50);
        assert!(!fired.load(Ordering::SeqCst));
        render(&mut graph, 50);
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(graph.pending_callbacks(), 0);
    }

    #[test]
    fn test_track_end_fires_listener() {
        let mut graph = AudioGraph::new(RATE);
        let track = graph.create_track(Box::new(vec![0.1f32; 8].into_iter()));
        let ended = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ended);
        graph
            .set_on_ended(
                track,
                Some(Box::new(move |graph: &mut AudioGraph| {
                    flag.store(true, Ordering::SeqCst);
                    let _ = graph.remove(track);
                })),
            )
            .unwrap();

        render(&mut graph, 16);
        assert!(ended.load(Ordering::SeqCst));
        assert!(!graph.contains(track));
    }

    #[test]
    fn test_triangle_starts_at_zero_and_peaks_at_quarter() {
        assert!(Waveform::Triangle.sample(0.0).abs() < 1e-6);
        assert!((Waveform::Triangle.sample(0.25) - 1.0).abs() < 1e-6);
        assert!((Waveform::Triangle.sample(0.75) + 1.0).abs() < 1e-6);
    }
}
