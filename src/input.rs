//! Live input state: fader levels and momentary button edges.
//!
//! External transports call the setters from their own threads; the tick
//! thread calls [`InputState::snapshot`] once per tick to get a coherent
//! view, then [`InputState::end_frame`] to clear consumed edges.

use std::collections::HashMap;
use std::sync::Mutex;

use number::UnipolarFloat;

/// Held/edge state for one button, as seen by the tick thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub held: bool,
    pub pressed_this_frame: bool,
    pub released_this_frame: bool,
}

/// An immutable per-tick view of all input state, cloned out of the lock.
#[derive(Clone, Debug, Default)]
pub struct InputSnapshot {
    pub faders: HashMap<String, UnipolarFloat>,
    pub buttons: HashMap<String, ButtonState>,
}

impl InputSnapshot {
    pub fn fader(&self, id: &str) -> UnipolarFloat {
        self.faders.get(id).copied().unwrap_or(UnipolarFloat::ZERO)
    }

    pub fn button(&self, id: &str) -> ButtonState {
        self.buttons.get(id).copied().unwrap_or_default()
    }
}

#[derive(Default)]
struct InputStateInner {
    faders: HashMap<String, UnipolarFloat>,
    buttons: HashMap<String, ButtonState>,
}

/// Mutex-guarded input state. Setters lock briefly; the tick thread clones
/// a full snapshot at the start of its tick rather than holding the lock
/// across node evaluation.
#[derive(Default)]
pub struct InputState {
    inner: Mutex<InputStateInner>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fader(&self, id: &str, v: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .faders
            .insert(id.to_string(), UnipolarFloat::new(v));
    }

    /// Sets the held state of a button, raising the appropriate edge flag
    /// iff this is a transition from the previous held state.
    pub fn set_button_down(&self, id: &str, down: bool) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.buttons.entry(id.to_string()).or_default();
        if down && !state.held {
            state.pressed_this_frame = true;
        } else if !down && state.held {
            state.released_this_frame = true;
        }
        state.held = down;
    }

    /// Synthesises a single-frame pulse: pressed this frame, not held.
    pub fn button_press(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.buttons.entry(id.to_string()).or_default();
        state.pressed_this_frame = true;
        state.held = false;
        state.released_this_frame = false;
    }

    /// Clones a coherent view of all input state for the tick about to run.
    pub fn snapshot(&self) -> InputSnapshot {
        let inner = self.inner.lock().unwrap();
        InputSnapshot {
            faders: inner.faders.clone(),
            buttons: inner.buttons.clone(),
        }
    }

    /// Clears edge flags for every button, to be called once at the end of
    /// the tick that observed them.
    pub fn end_frame(&self) {
        let mut inner = self.inner.lock().unwrap();
        for state in inner.buttons.values_mut() {
            state.pressed_this_frame = false;
            state.released_this_frame = false;
        }
    }
}
