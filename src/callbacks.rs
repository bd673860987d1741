use std::fmt;

/// Host lifecycle points a script can attach a callback to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeFrame,
    AfterFrame,
    BeforeExit,
    AfterPowerOn,
    BeforePowerOff,
    BeforeStateLoad,
    AfterStateLoad,
    BeforeStateSave,
    AfterStateSave,
}

impl EventKind {
    pub const COUNT: usize = 9;
    pub const ALL: [EventKind; EventKind::COUNT] = [
        EventKind::BeforeFrame,
        EventKind::AfterFrame,
        EventKind::BeforeExit,
        EventKind::AfterPowerOn,
        EventKind::BeforePowerOff,
        EventKind::BeforeStateLoad,
        EventKind::AfterStateLoad,
        EventKind::BeforeStateSave,
        EventKind::AfterStateSave,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Name of the `emu.*` function that fills this slot.
    pub fn register_fn(self) -> &'static str {
        match self {
            EventKind::BeforeFrame => "registerbefore",
            EventKind::AfterFrame => "registerafter",
            EventKind::BeforeExit => "registerexit",
            EventKind::AfterPowerOn => "registerrun",
            EventKind::BeforePowerOff => "registerclose",
            EventKind::BeforeStateLoad => "registerloading",
            EventKind::AfterStateLoad => "registerloaded",
            EventKind::BeforeStateSave => "registersaving",
            EventKind::AfterStateSave => "registersaved",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::BeforeFrame => "before_frame",
            EventKind::AfterFrame => "after_frame",
            EventKind::BeforeExit => "before_exit",
            EventKind::AfterPowerOn => "after_power_on",
            EventKind::BeforePowerOff => "before_power_off",
            EventKind::BeforeStateLoad => "before_state_load",
            EventKind::AfterStateLoad => "after_state_load",
            EventKind::BeforeStateSave => "before_state_save",
            EventKind::AfterStateSave => "after_state_save",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One callable per lifecycle event plus the GUI redraw slot.
#[derive(Debug)]
pub struct CallbackSlots<C> {
    events: [Option<C>; EventKind::COUNT],
    gui: Option<C>,
}

impl<C> Default for CallbackSlots<C> {
    fn default() -> Self {
        Self { events: std::array::from_fn(|_| None), gui: None }
    }
}

impl<C> CallbackSlots<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` (or clears the slot) and hands back whatever was there before.
    pub fn replace(&mut self, kind: EventKind, callback: Option<C>) -> Option<C> {
        std::mem::replace(&mut self.events[kind.index()], callback)
    }

    pub fn get(&self, kind: EventKind) -> Option<&C> {
        self.events[kind.index()].as_ref()
    }

    pub fn replace_gui(&mut self, callback: Option<C>) -> Option<C> {
        std::mem::replace(&mut self.gui, callback)
    }

    pub fn gui(&self) -> Option<&C> {
        self.gui.as_ref()
    }

    pub fn registered(&self) -> usize {
        self.events.iter().filter(|slot| slot.is_some()).count() + usize::from(self.gui.is_some())
    }

    pub fn clear(&mut self) {
        self.events.iter_mut().for_each(|slot| *slot = None);
        self.gui = None;
    }
}
