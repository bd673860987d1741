use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ScriptError;
use crate::hook_index::HookIndex;

/// Memory hook kinds: access type crossed with the bus that performed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    Write,
    Read,
    Exec,
    WriteSub,
    ReadSub,
    ExecSub,
}

impl HookKind {
    pub const COUNT: usize = 6;
    pub const ALL: [HookKind; HookKind::COUNT] =
        [HookKind::Write, HookKind::Read, HookKind::Exec, HookKind::WriteSub, HookKind::ReadSub, HookKind::ExecSub];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Moves a main-bus kind onto the requested bus. Sub-bus kinds are left alone.
    pub fn on_bus(self, bus: Bus) -> Self {
        match (self, bus) {
            (HookKind::Write, Bus::Sub) => HookKind::WriteSub,
            (HookKind::Read, Bus::Sub) => HookKind::ReadSub,
            (HookKind::Exec, Bus::Sub) => HookKind::ExecSub,
            (kind, _) => kind,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HookKind::Write => "write",
            HookKind::Read => "read",
            HookKind::Exec => "exec",
            HookKind::WriteSub => "write_sub",
            HookKind::ReadSub => "read_sub",
            HookKind::ExecSub => "exec_sub",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    pub fn is_write(self) -> bool {
        matches!(self, HookKind::Write | HookKind::WriteSub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bus {
    #[default]
    Main,
    Sub,
}

impl Bus {
    /// Only `"sub"` (any case) names the secondary bus; every other name means the main bus.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("sub") {
            Bus::Sub
        } else {
            Bus::Main
        }
    }
}

/// A normalized, non-wrapping run of hooked bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSpan {
    pub start: u32,
    pub len: u32,
}

impl HookSpan {
    /// Normalizes a guest-supplied `(address, size)` pair. A negative size names the bytes that end
    /// at `address`.
    pub fn normalize(address: i64, size: i64, max_span: u32) -> Result<Self, ScriptError> {
        let (start, len) = if size < 0 {
            let len = size.unsigned_abs();
            (address.checked_sub_unsigned(len).ok_or(ScriptError::AddressOutOfRange(address))?, len)
        } else {
            (address, size as u64)
        };
        if len > u64::from(max_span) {
            return Err(ScriptError::SpanTooLarge { len, max: max_span });
        }
        let start32 = u32::try_from(start).map_err(|_| ScriptError::AddressOutOfRange(start))?;
        if u64::from(start32) + len > 1 << 32 {
            return Err(ScriptError::AddressOutOfRange(start + len as i64 - 1));
        }
        Ok(Self { start: start32, len: len as u32 })
    }

    pub fn addresses(self) -> impl Iterator<Item = u32> {
        (0..self.len).map(move |offset| self.start + offset)
    }
}

/// Result of a registration, mostly useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub span: HookSpan,
    pub displaced: u32,
    pub installed: u32,
}

/// Per-kind address → callback tables with their derived [`HookIndex`] and active counts.
#[derive(Debug)]
pub struct HookRegistry<C> {
    tables: [BTreeMap<u32, C>; HookKind::COUNT],
    indices: [HookIndex; HookKind::COUNT],
    active: [u32; HookKind::COUNT],
    max_span: u32,
}

impl<C: Clone> HookRegistry<C> {
    pub fn new(max_span: u32) -> Self {
        Self {
            tables: std::array::from_fn(|_| BTreeMap::new()),
            indices: std::array::from_fn(|_| HookIndex::new()),
            active: [0; HookKind::COUNT],
            max_span,
        }
    }

    /// Installs `callback` on every byte of the span, or clears the span when `callback` is `None`.
    pub fn register(
        &mut self,
        kind: HookKind,
        address: i64,
        size: i64,
        callback: Option<C>,
    ) -> Result<Registration, ScriptError> {
        let span = HookSpan::normalize(address, size, self.max_span)?;
        let table = &mut self.tables[kind.index()];
        let displaced = span.addresses().filter(|addr| table.contains_key(addr)).count() as u32;
        let installed = match callback {
            Some(callback) => {
                for addr in span.addresses() {
                    table.insert(addr, callback.clone());
                }
                span.len
            }
            None => {
                for addr in span.addresses() {
                    table.remove(&addr);
                }
                0
            }
        };
        let active = &mut self.active[kind.index()];
        *active = *active + installed - displaced;
        debug_assert_eq!(*active as usize, table.len());
        self.rebuild(kind);
        debug!(
            kind = kind.label(),
            start = span.start,
            len = span.len,
            displaced,
            installed,
            "memory hook registration"
        );
        Ok(Registration { span, displaced, installed })
    }

    fn rebuild(&mut self, kind: HookKind) {
        self.indices[kind.index()] = HookIndex::build(self.tables[kind.index()].keys().copied());
    }

    #[inline]
    pub fn active_count(&self, kind: HookKind) -> u32 {
        self.active[kind.index()]
    }

    pub fn total_active(&self) -> u32 {
        self.active.iter().sum()
    }

    pub fn index(&self, kind: HookKind) -> &HookIndex {
        &self.indices[kind.index()]
    }

    /// First callback hooked on `[address, address + size)`, scanning bytes upward.
    #[inline]
    pub fn lookup(&self, kind: HookKind, address: u32, size: u32) -> Option<&C> {
        if self.active[kind.index()] == 0 || size == 0 {
            return None;
        }
        if !self.indices[kind.index()].contains(address, size) {
            return None;
        }
        let last = address.saturating_add(size - 1);
        self.tables[kind.index()].range(address..=last).next().map(|(_, callback)| callback)
    }

    /// Drops every hook, zeroes the counters and leaves every index empty.
    pub fn clear(&mut self) {
        for kind in HookKind::ALL {
            self.tables[kind.index()].clear();
            self.active[kind.index()] = 0;
            self.rebuild(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_SPAN: u32 = 0x1_0000;

    fn hooked(registry: &HookRegistry<&'static str>, kind: HookKind) -> Vec<(u32, &'static str)> {
        registry.tables[kind.index()].iter().map(|(addr, cb)| (*addr, *cb)).collect()
    }

    #[test]
    fn negative_size_hooks_the_bytes_ending_at_address() {
        let mut shifted = HookRegistry::new(MAX_SPAN);
        let mut explicit = HookRegistry::new(MAX_SPAN);
        let a = shifted.register(HookKind::Write, 0x110, -4, Some("cb")).expect("register");
        let b = explicit.register(HookKind::Write, 0x10c, 4, Some("cb")).expect("register");
        assert_eq!(a, b);
        assert_eq!(hooked(&shifted, HookKind::Write), hooked(&explicit, HookKind::Write));
        assert_eq!(a.span, HookSpan { start: 0x10c, len: 4 });
        assert_eq!(shifted.index(HookKind::Write).narrow_islands(), explicit.index(HookKind::Write).narrow_islands());
    }

    #[test]
    fn active_count_tracks_displaced_and_cleared_slots() {
        let mut registry = HookRegistry::new(MAX_SPAN);
        registry.register(HookKind::Read, 0x200, 8, Some("a")).expect("register");
        assert_eq!(registry.active_count(HookKind::Read), 8);
        let reg = registry.register(HookKind::Read, 0x204, 8, Some("b")).expect("register");
        assert_eq!((reg.displaced, reg.installed), (4, 8));
        assert_eq!(registry.active_count(HookKind::Read), 12);
        registry.register(HookKind::Read, 0x200, 2, None).expect("clear");
        assert_eq!(registry.active_count(HookKind::Read), 10);
        assert_eq!(registry.active_count(HookKind::Write), 0);
        assert_eq!(registry.total_active(), 10);
    }

    #[test]
    fn lookup_returns_first_hooked_byte_only() {
        let mut registry = HookRegistry::new(MAX_SPAN);
        registry.register(HookKind::Write, 0x101, 1, Some("second")).expect("register");
        registry.register(HookKind::Write, 0x103, 1, Some("fourth")).expect("register");
        assert_eq!(registry.lookup(HookKind::Write, 0x100, 4), Some(&"second"));
        assert_eq!(registry.lookup(HookKind::Write, 0x102, 2), Some(&"fourth"));
        assert_eq!(registry.lookup(HookKind::Write, 0x104, 4), None);
        assert_eq!(registry.lookup(HookKind::Read, 0x100, 4), None);
    }

    #[test]
    fn clear_empties_every_kind() {
        let mut registry = HookRegistry::new(MAX_SPAN);
        for kind in HookKind::ALL {
            registry.register(kind, 0x40, 2, Some("cb")).expect("register");
        }
        registry.clear();
        for kind in HookKind::ALL {
            assert_eq!(registry.active_count(kind), 0);
            assert!(registry.index(kind).is_empty());
            assert_eq!(registry.lookup(kind, 0x40, 2), None);
        }
    }

    #[test]
    fn rejects_spans_outside_the_address_space() {
        let mut registry: HookRegistry<&str> = HookRegistry::new(MAX_SPAN);
        assert!(matches!(
            registry.register(HookKind::Write, 2, -4, Some("cb")),
            Err(ScriptError::AddressOutOfRange(_))
        ));
        assert!(matches!(
            registry.register(HookKind::Write, 0xFFFF_FFFF, 2, Some("cb")),
            Err(ScriptError::AddressOutOfRange(_))
        ));
        assert!(matches!(
            registry.register(HookKind::Write, 0, i64::from(MAX_SPAN) + 1, Some("cb")),
            Err(ScriptError::SpanTooLarge { .. })
        ));
        assert_eq!(registry.total_active(), 0);
        registry.register(HookKind::Write, 0xFFFF_FFFF, 1, Some("cb")).expect("last byte is addressable");
        assert_eq!(registry.lookup(HookKind::Write, 0xFFFF_FFFF, 1), Some(&"cb"));
    }

    #[test]
    fn bus_names_select_sub_variants() {
        assert_eq!(HookKind::Write.on_bus(Bus::from_name("SUB")), HookKind::WriteSub);
        assert_eq!(HookKind::Exec.on_bus(Bus::from_name("main")), HookKind::Exec);
        assert_eq!(HookKind::ReadSub.on_bus(Bus::Main), HookKind::ReadSub);
    }
}
