use crate::counter::{FrameCounter, Timer};
use crate::error::ErrorDetail;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

/// The number of frame counters / timers per layer.
const COUNTERS_PER_LAYER: usize = 255;
/// The two counter/timer layers the scenario can address.
const COUNTER_LAYERS: usize = 2;

/// A screen-space point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// The mouse inputs the interpreter distinguishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    WheelUp,
    WheelDown,
}

/// The keys the interpreter distinguishes.  Everything else arrives as
/// [KeyCode::Other] and falls through unhandled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyCode {
    Space,
    Return,
    Up,
    Down,
    LeftCtrl,
    RightCtrl,
    Other(u32),
}

impl KeyCode {
    pub fn is_ctrl(self) -> bool {
        matches!(self, KeyCode::LeftCtrl | KeyCode::RightCtrl)
    }
}

/// One input event as delivered to the top long operation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Event {
    MouseMotion(Point),
    MouseButton { button: MouseButton, pressed: bool },
    Key { code: KeyCode, pressed: bool },
}

/// Source of the millisecond tick count.  The production clock reads the
/// wall; tests substitute a manually advanced one so every time-driven
/// behaviour is deterministic.
pub trait Clock {
    fn ticks(&self) -> u32;
}

/// Milliseconds since construction.
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        WallClock {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock::new()
    }
}

impl Clock for WallClock {
    fn ticks(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

/// A clock that only moves when told to.
pub struct TestClock {
    now: Cell<u32>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock { now: Cell::new(0) }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get() + ms);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        TestClock::new()
    }
}

impl Clock for TestClock {
    fn ticks(&self) -> u32 {
        self.now.get()
    }
}

/// The input/timing hub: pending events, modifier state, the tick clock, the
/// frame counter and timer tables, and the realtime/nice task counters that
/// steer the host frame pacer.
pub struct EventSystem {
    clock: Rc<dyn Clock>,
    queue: VecDeque<Event>,
    ctrl_pressed: bool,
    shift_pressed: bool,
    mouse_position: Point,
    frame_counters: Vec<Vec<Option<FrameCounter>>>,
    timers: Vec<Vec<Timer>>,
    realtime_tasks: usize,
    nice_tasks: usize,
}

impl EventSystem {
    /// Constructor using the wall clock.
    pub fn new() -> Self {
        EventSystem::with_clock(Rc::new(WallClock::new()))
    }

    /// Constructor with an explicit clock, used by every time-sensitive test.
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        EventSystem {
            clock,
            queue: VecDeque::new(),
            ctrl_pressed: false,
            shift_pressed: false,
            mouse_position: Point::default(),
            frame_counters: (0..COUNTER_LAYERS)
                .map(|_| (0..COUNTERS_PER_LAYER).map(|_| None).collect())
                .collect(),
            timers: (0..COUNTER_LAYERS)
                .map(|_| vec![Timer::default(); COUNTERS_PER_LAYER])
                .collect(),
            realtime_tasks: 0,
            nice_tasks: 0,
        }
    }

    /// Returns the number of milliseconds since the program started.
    pub fn ticks(&self) -> u32 {
        self.clock.ticks()
    }

    /// Queues an input event and updates the modifier / cursor state the
    /// scenario can poll directly.
    pub fn inject(&mut self, event: Event) {
        match event {
            Event::Key { code, pressed } if code.is_ctrl() => self.ctrl_pressed = pressed,
            Event::MouseMotion(p) => self.mouse_position = p,
            _ => {}
        }
        self.queue.push_back(event);
    }

    /// Removes and returns the oldest pending event.
    pub fn pop_event(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Returns whether a ctrl key is currently held.
    pub fn ctrl_pressed(&self) -> bool {
        self.ctrl_pressed
    }

    pub fn set_shift_pressed(&mut self, pressed: bool) {
        self.shift_pressed = pressed;
    }

    pub fn shift_pressed(&self) -> bool {
        self.shift_pressed
    }

    /// Returns the most recently reported cursor position.
    pub fn cursor_position(&self) -> Point {
        self.mouse_position
    }

    fn check_layer_and_counter(layer: usize, counter: usize) -> Result<(), ErrorDetail> {
        if layer >= COUNTER_LAYERS || counter >= COUNTERS_PER_LAYER {
            return Err(ErrorDetail::BadOpcodeArguments {
                name: "frame_counter".to_string(),
                reason: format!("layer {} counter {} out of range", layer, counter),
            });
        }
        Ok(())
    }

    /// Installs a frame counter, replacing any existing one in the slot.  An
    /// installed counter counts as a realtime task until it deactivates.
    pub fn set_frame_counter(
        &mut self,
        layer: usize,
        counter: usize,
        frame_counter: FrameCounter,
    ) -> Result<(), ErrorDetail> {
        Self::check_layer_and_counter(layer, counter)?;
        let slot = &mut self.frame_counters[layer][counter];
        if slot.as_ref().map(|c| c.is_active()).unwrap_or(false) {
            self.realtime_tasks -= 1;
        }
        if frame_counter.is_active() {
            self.realtime_tasks += 1;
        }
        *slot = Some(frame_counter);
        Ok(())
    }

    /// Returns true if the slot holds a counter.
    pub fn frame_counter_exists(&self, layer: usize, counter: usize) -> bool {
        Self::check_layer_and_counter(layer, counter).is_ok()
            && self.frame_counters[layer][counter].is_some()
    }

    /// Reads the current value of the counter in the slot, advancing it.  A
    /// counter that finishes during this read releases its realtime task.
    pub fn read_frame_counter(&mut self, layer: usize, counter: usize) -> Result<i32, ErrorDetail> {
        Self::check_layer_and_counter(layer, counter)?;
        let now = self.clock.ticks();
        match &mut self.frame_counters[layer][counter] {
            Some(frame_counter) => {
                let (value, finished) = frame_counter.read_frame(now);
                if finished {
                    self.realtime_tasks -= 1;
                }
                Ok(value)
            }
            None => Ok(0),
        }
    }

    /// Returns whether the counter in the slot is still running.
    pub fn frame_counter_active(&self, layer: usize, counter: usize) -> bool {
        self.frame_counters
            .get(layer)
            .and_then(|l| l.get(counter))
            .and_then(|c| c.as_ref())
            .map(|c| c.is_active())
            .unwrap_or(false)
    }

    /// Reads the timer in the slot.
    pub fn read_timer(&self, layer: usize, counter: usize) -> Result<u32, ErrorDetail> {
        Self::check_layer_and_counter(layer, counter)?;
        Ok(self.timers[layer][counter].read(self.clock.ticks()))
    }

    /// Sets the timer in the slot to `value`.
    pub fn set_timer(&mut self, layer: usize, counter: usize, value: u32) -> Result<(), ErrorDetail> {
        Self::check_layer_and_counter(layer, counter)?;
        let now = self.clock.ticks();
        self.timers[layer][counter].set(now, value);
        Ok(())
    }

    /// Marks the start of a task needing realtime frame pacing (an effect or
    /// animation).  While any such task runs the frame loop must not sleep.
    pub fn begin_realtime_task(&mut self) {
        self.realtime_tasks += 1;
    }

    pub fn end_realtime_task(&mut self) {
        self.realtime_tasks = self.realtime_tasks.saturating_sub(1);
    }

    /// Marks the start of an idle wait during which the frame loop may sleep
    /// ~10 ms between passes.
    pub fn begin_nice_task(&mut self) {
        self.nice_tasks += 1;
    }

    pub fn end_nice_task(&mut self) {
        self.nice_tasks = self.nice_tasks.saturating_sub(1);
    }

    /// Whether the host frame loop may yield the CPU this pass.
    pub fn can_be_nice(&self) -> bool {
        self.realtime_tasks == 0 && self.nice_tasks > 0
    }

    /// Whether anything realtime is in flight.
    pub fn has_realtime_tasks(&self) -> bool {
        self.realtime_tasks > 0
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        EventSystem::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterKind;

    fn setup_test_events() -> (Rc<TestClock>, EventSystem) {
        let clock = Rc::new(TestClock::new());
        let events = EventSystem::with_clock(clock.clone());
        (clock, events)
    }

    #[test]
    fn test_events_drain_in_arrival_order() {
        let (_clock, mut events) = setup_test_events();
        events.inject(Event::MouseButton {
            button: MouseButton::Left,
            pressed: true,
        });
        events.inject(Event::Key {
            code: KeyCode::Return,
            pressed: true,
        });
        assert!(matches!(
            events.pop_event(),
            Some(Event::MouseButton { .. })
        ));
        assert!(matches!(events.pop_event(), Some(Event::Key { .. })));
        assert!(events.pop_event().is_none());
    }

    #[test]
    fn test_ctrl_state_tracks_key_events() {
        let (_clock, mut events) = setup_test_events();
        assert!(!events.ctrl_pressed());
        events.inject(Event::Key {
            code: KeyCode::LeftCtrl,
            pressed: true,
        });
        assert!(events.ctrl_pressed());
        events.inject(Event::Key {
            code: KeyCode::LeftCtrl,
            pressed: false,
        });
        assert!(!events.ctrl_pressed());
    }

    #[test]
    fn test_timer_set_then_read_through_system() {
        let (clock, mut events) = setup_test_events();
        clock.set(5000);
        events.set_timer(0, 10, 123).unwrap();
        assert_eq!(events.read_timer(0, 10).unwrap(), 123);
        clock.advance(77);
        assert_eq!(events.read_timer(0, 10).unwrap(), 200);
    }

    #[test]
    fn test_counter_realtime_task_released_on_finish() {
        let (clock, mut events) = setup_test_events();
        let counter = FrameCounter::new(CounterKind::Simple, 0, 10, 100, 0);
        events.set_frame_counter(1, 3, counter).unwrap();
        assert!(events.has_realtime_tasks());
        assert!(events.frame_counter_active(1, 3));

        clock.set(250);
        assert_eq!(events.read_frame_counter(1, 3).unwrap(), 10);
        assert!(!events.has_realtime_tasks());
        assert!(!events.frame_counter_active(1, 3));
        // The slot still exists and reads its terminal value.
        assert!(events.frame_counter_exists(1, 3));
        assert_eq!(events.read_frame_counter(1, 3).unwrap(), 10);
    }

    #[test]
    fn test_replacing_active_counter_keeps_task_count_balanced() {
        let (_clock, mut events) = setup_test_events();
        let first = FrameCounter::new(CounterKind::Loop, 0, 10, 100, 0);
        let second = FrameCounter::new(CounterKind::Loop, 0, 20, 100, 0);
        events.set_frame_counter(0, 0, first).unwrap();
        events.set_frame_counter(0, 0, second).unwrap();
        events.end_realtime_task();
        assert!(!events.has_realtime_tasks());
    }

    #[test]
    fn test_out_of_range_counter_slot_is_an_error() {
        let (_clock, mut events) = setup_test_events();
        assert!(events.read_frame_counter(2, 0).is_err());
        assert!(events.set_timer(0, 255, 0).is_err());
    }

    #[test]
    fn test_nice_only_when_no_realtime_tasks() {
        let (_clock, mut events) = setup_test_events();
        assert!(!events.can_be_nice());
        events.begin_nice_task();
        assert!(events.can_be_nice());
        events.begin_realtime_task();
        assert!(!events.can_be_nice());
        events.end_realtime_task();
        assert!(events.can_be_nice());
        events.end_nice_task();
        assert!(!events.can_be_nice());
    }
}
