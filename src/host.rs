use crate::joypad::{Buttons, PORT_COUNT};
use crate::overlay::ColorDepth;

/// What the bridge needs from the emulator it is attached to.
///
/// Word and dword accessors default to little-endian compositions of the byte accessors.
pub trait EmulatorHost {
    fn read_byte(&self, address: u32) -> u8;
    fn write_byte(&mut self, address: u32, value: u8);

    fn read_word(&self, address: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(address), self.read_byte(address.wrapping_add(1))])
    }

    fn read_dword(&self, address: u32) -> u32 {
        u32::from(self.read_word(address)) | u32::from(self.read_word(address.wrapping_add(2))) << 16
    }

    fn write_word(&mut self, address: u32, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(address, lo);
        self.write_byte(address.wrapping_add(1), hi);
    }

    fn write_dword(&mut self, address: u32, value: u32) {
        self.write_word(address, value as u16);
        self.write_word(address.wrapping_add(2), (value >> 16) as u16);
    }

    /// Bits per pixel of the frames handed to the overlay compositor.
    fn color_depth(&self) -> u32 {
        32
    }

    /// Bit positions of red, green and blue inside one pixel.
    fn channel_shifts(&self) -> [u32; 3] {
        ColorDepth::from_bits(self.color_depth()).map(ColorDepth::default_shifts).unwrap_or([16, 8, 0])
    }

    fn set_paused(&mut self, paused: bool);
    fn is_paused(&self) -> bool;

    /// Zero-based port used when a script does not name one.
    fn default_joypad(&self) -> usize {
        0
    }

    /// Buttons physically held on `port` this frame.
    fn joypad_state(&self, port: usize) -> Buttons;

    fn show_message(&mut self, text: &str);

    fn frame_count(&self) -> u32;
    fn lag_count(&self) -> u32;
    fn lagged(&self) -> bool;
    fn is_emulating(&self) -> bool;

    fn throttle(&self) -> u32;
    fn set_throttle(&mut self, percent: u32);

    fn on_script_start(&mut self) {}
    fn on_script_stop(&mut self) {}
}

/// Flat-memory emulator stand-in used by the command-line runner, the harness and tests.
#[derive(Debug, Clone)]
pub struct RamHost {
    memory: Vec<u8>,
    pub paused: bool,
    pub frame: u32,
    pub lag: u32,
    pub lagged: bool,
    pub emulating: bool,
    pub throttle: u32,
    pub default_port: usize,
    pub joypads: [Buttons; PORT_COUNT],
    pub messages: Vec<String>,
    pub color_depth: u32,
    pub starts: u32,
    pub stops: u32,
}

impl RamHost {
    pub const DEFAULT_MEMORY_SIZE: usize = 0x1_0000;

    pub fn new(memory_size: usize) -> Self {
        Self {
            memory: vec![0; memory_size.max(1)],
            paused: false,
            frame: 0,
            lag: 0,
            lagged: false,
            emulating: true,
            throttle: 100,
            default_port: 0,
            joypads: [Buttons::empty(); PORT_COUNT],
            messages: Vec::new(),
            color_depth: 32,
            starts: 0,
            stops: 0,
        }
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Addresses wrap around the end of memory.
    fn slot(&self, address: u32) -> usize {
        address as usize % self.memory.len()
    }

    /// Moves the emulated clock forward one frame.
    pub fn advance_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        if self.lagged {
            self.lag = self.lag.wrapping_add(1);
        }
    }
}

impl Default for RamHost {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MEMORY_SIZE)
    }
}

impl EmulatorHost for RamHost {
    fn read_byte(&self, address: u32) -> u8 {
        self.memory[self.slot(address)]
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        let slot = self.slot(address);
        self.memory[slot] = value;
    }

    fn color_depth(&self) -> u32 {
        self.color_depth
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn default_joypad(&self) -> usize {
        self.default_port
    }

    fn joypad_state(&self, port: usize) -> Buttons {
        self.joypads.get(port).copied().unwrap_or_default()
    }

    fn show_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn frame_count(&self) -> u32 {
        self.frame
    }

    fn lag_count(&self) -> u32 {
        self.lag
    }

    fn lagged(&self) -> bool {
        self.lagged
    }

    fn is_emulating(&self) -> bool {
        self.emulating
    }

    fn throttle(&self) -> u32 {
        self.throttle
    }

    fn set_throttle(&mut self, percent: u32) {
        self.throttle = percent;
    }

    fn on_script_start(&mut self) {
        self.starts += 1;
    }

    fn on_script_stop(&mut self) {
        self.stops += 1;
    }
}
