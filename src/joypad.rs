use bitflags::bitflags;

pub const PORT_COUNT: usize = 4;
pub const REMAP_BUTTONS: usize = 10;

bitflags! {
    /// Controller buttons in the host's raw bit order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const A = 1 << 0;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const UP = 1 << 6;
        const DOWN = 1 << 7;
        const R = 1 << 8;
        const L = 1 << 9;
    }
}

/// Guest-facing button names, indexed by bit position.
pub const BUTTON_NAMES: [&str; REMAP_BUTTONS] = ["A", "B", "select", "start", "right", "left", "up", "down", "R", "L"];

impl Buttons {
    /// Looks up a button by its guest-facing name, ignoring ASCII case.
    pub fn from_guest_name(name: &str) -> Option<Self> {
        BUTTON_NAMES
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .map(|bit| Buttons::from_bits_truncate(1 << bit))
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        BUTTON_NAMES.iter().enumerate().filter(move |(bit, _)| self.bits() & (1 << bit) != 0).map(|(_, name)| *name)
    }
}

/// Where a piece of input came from when the host asks for a display remap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoypadSource {
    User,
    Playback,
    Record,
    Script,
    Game,
}

/// Maps a guest port request onto a physical port, falling back to the host default.
pub fn resolve_port(port: i64, default_port: usize) -> usize {
    match usize::try_from(port) {
        Ok(port) if port < PORT_COUNT => port,
        _ => default_port.min(PORT_COUNT - 1),
    }
}

/// Controller state a script is forcing for the current frame.
#[derive(Debug, Clone, Default)]
pub struct JoypadOverrides {
    used: u8,
    values: [Buttons; PORT_COUNT],
}

impl JoypadOverrides {
    pub fn set(&mut self, port: usize, buttons: Buttons) {
        self.values[port] = buttons;
        self.used |= 1 << port;
    }

    pub fn is_overridden(&self, port: usize) -> bool {
        self.used & (1 << port) != 0
    }

    pub fn read(&self, port: usize) -> Buttons {
        self.values[port]
    }

    /// Overrides only last one frame; the mask is dropped at every frame boundary.
    pub fn clear_frame(&mut self) {
        self.used = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InputDisplayRemap {
    from: u32,
    to: [u32; REMAP_BUTTONS],
}

/// Per-port input-display remaps. Scripts edit the `next` table; it becomes `current` at the next
/// frame boundary. Playback input is displayed through `next` because it describes the frame about to
/// be emulated.
#[derive(Debug, Clone, Default)]
pub struct InputDisplayRemaps {
    current: [InputDisplayRemap; PORT_COUNT],
    next: [InputDisplayRemap; PORT_COUNT],
}

impl InputDisplayRemaps {
    /// Displays `button` on `port` as `target`, or restores it when `target` is `None`.
    pub fn set(&mut self, port: usize, button: Buttons, target: Option<Buttons>) {
        let remap = &mut self.next[port];
        for bit in 0..REMAP_BUTTONS {
            if button.bits() & (1 << bit) == 0 {
                continue;
            }
            match target {
                Some(target) => {
                    remap.from |= 1 << bit;
                    remap.to[bit] = u32::from(target.bits());
                }
                None => {
                    remap.from &= !(1 << bit);
                    remap.to[bit] = 0;
                }
            }
        }
    }

    pub fn is_remapping(&self, port: usize) -> bool {
        self.current[port].from != 0 || self.next[port].from != 0
    }

    pub fn remap(&self, port: usize, input: u32, source: JoypadSource) -> u32 {
        let remap = if source == JoypadSource::Playback { &self.next[port] } else { &self.current[port] };
        (0..REMAP_BUTTONS).fold(0, |output, bit| {
            let mask = 1 << bit;
            if input & remap.from & mask != 0 {
                output | remap.to[bit]
            } else {
                output | (input & mask)
            }
        })
    }

    pub fn advance_frame(&mut self) {
        self.current = self.next;
    }
}
