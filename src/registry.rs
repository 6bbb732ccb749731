//! The process-variable registry: a fixed-capacity, append-only table of
//! named, typed, ranged values (spec §3, §4.1).

use crate::error::DispatchError;

/// Registry capacity. The source keeps this well above the PV count it
/// actually populates (`pv_t g_pvs[BEAMLINE_MAX_PVS]`); spec §4.1 calls for
/// "N < 128".
pub const MAX_PVS: usize = 64;

/// Directional/semantic type of a PV. The dispatcher treats all PVs as
/// floating point uniformly (spec §3); `PvKind` exists for introspection
/// and to drive default writability, not for value representation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PvKind {
    AnalogInput,
    AnalogOutput,
    BinaryInput,
    BinaryOutput,
}

impl PvKind {
    #[inline]
    pub fn default_writable(self) -> bool {
        matches!(self, PvKind::AnalogOutput | PvKind::BinaryOutput)
    }
}

/// Stable handle into the registry. Identity is the index, which never
/// changes for process lifetime since the registry is append-only.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PvHandle(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Pv {
    pub name: String,
    pub kind: PvKind,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub writable: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    pvs: Vec<Pv>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            pvs: Vec::with_capacity(MAX_PVS),
        }
    }

    /// Registers a new PV. Returns `None` (and logs) if the registry is
    /// already at capacity, mirroring `pv_register`'s full-table guard.
    pub fn register(&mut self, name: &str, kind: PvKind, min: f64, max: f64) -> Option<PvHandle> {
        self.register_with_writable(name, kind, min, max, kind.default_writable())
    }

    pub fn register_with_writable(
        &mut self,
        name: &str,
        kind: PvKind,
        min: f64,
        max: f64,
        writable: bool,
    ) -> Option<PvHandle> {
        if self.pvs.len() >= MAX_PVS {
            log::error!("PV registry full, cannot register: {name}");
            return None;
        }
        let handle = PvHandle(self.pvs.len());
        self.pvs.push(Pv {
            name: name.to_owned(),
            kind,
            value: 0.0,
            min,
            max,
            writable,
        });
        Some(handle)
    }

    /// Linear scan by exact name equality (spec §4.1: O(N), N fixed & small).
    pub fn find(&self, name: &str) -> Option<PvHandle> {
        self.pvs
            .iter()
            .position(|pv| pv.name == name)
            .map(PvHandle)
    }

    pub fn pv(&self, handle: PvHandle) -> &Pv {
        &self.pvs[handle.0]
    }

    #[inline]
    pub fn get(&self, handle: PvHandle) -> f64 {
        self.pvs[handle.0].value
    }

    /// External write path (PUT / MOVE setpoint write). Validates
    /// writability and range; rejects otherwise without mutating.
    pub fn set(&mut self, handle: PvHandle, value: f64) -> Result<(), DispatchError> {
        let pv = &self.pvs[handle.0];
        if !pv.writable || value < pv.min || value > pv.max {
            return Err(DispatchError::InvalidValue);
        }
        self.pvs[handle.0].value = value;
        // BL02:MONO:ENERGY mirrors into its readback synchronously (spec §4.1
        // "Special case"; exact name match per original_source/devices.c).
        if self.pvs[handle.0].name == "BL02:MONO:ENERGY" {
            if let Some(rbv) = self.find("BL02:MONO:ENERGY.RBV") {
                self.pvs[rbv.0].value = value;
            }
        }
        Ok(())
    }

    /// Internal write path used by the simulation tick and motor kinematics.
    /// Bypasses the `writable` gate (that gate only governs protocol PUTs),
    /// but still clamps to the PV's declared range.
    pub(crate) fn write_internal(&mut self, handle: PvHandle, value: f64) {
        let pv = &mut self.pvs[handle.0];
        pv.value = value.clamp(pv.min, pv.max);
    }

    pub(crate) fn len(&self) -> usize {
        self.pvs.len()
    }

    pub(crate) fn handle_at(&self, index: usize) -> PvHandle {
        PvHandle(index)
    }

    /// Enumerates names matching `pattern` (spec §4.1), comma-joined and
    /// truncated to fit `cap` bytes without ever emitting a partial name
    /// (SPEC_FULL §4, "LIST truncation").
    pub fn list(&self, pattern: Option<&str>, cap: usize) -> String {
        let mut out = String::new();
        for pv in &self.pvs {
            if !glob_match(pattern.unwrap_or(""), &pv.name) {
                continue;
            }
            let sep = usize::from(!out.is_empty());
            if out.len() + sep + pv.name.len() > cap {
                break;
            }
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(&pv.name);
        }
        out
    }
}

/// Glob match: `*` matches any (possibly empty) substring, every other
/// character matches literally, whole-string anchored (spec §4.1). An empty
/// or absent pattern matches everything.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    match pattern.find('*') {
        None => pattern == name,
        Some(star) => {
            let (head, rest) = pattern.split_at(star);
            let tail = &rest[1..];
            if !name.starts_with(head) {
                return false;
            }
            let remaining = &name[head.len()..];
            if tail.is_empty() {
                return true;
            }
            match tail.find('*') {
                None => remaining.ends_with(tail),
                Some(_) => {
                    // Multiple '*' tokens: find the leftmost occurrence of
                    // the next literal run and recurse on what follows it.
                    let next_star = tail.find('*').unwrap();
                    let literal = &tail[..next_star];
                    match remaining.find(literal) {
                        None => false,
                        Some(pos) => {
                            glob_match(&tail[next_star..], &remaining[pos + literal.len()..])
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_is_stable_and_linear() {
        let mut reg = Registry::new();
        let a = reg
            .register("BL02:A", PvKind::AnalogInput, 0.0, 1.0)
            .unwrap();
        let b = reg
            .register("BL02:B", PvKind::AnalogInput, 0.0, 1.0)
            .unwrap();
        assert_eq!(reg.find("BL02:A"), Some(a));
        assert_eq!(reg.find("BL02:B"), Some(b));
        assert_eq!(reg.find("BL02:C"), None);
    }

    #[test]
    fn set_rejects_non_writable() {
        let mut reg = Registry::new();
        let h = reg
            .register("BL02:RO", PvKind::AnalogInput, 0.0, 10.0)
            .unwrap();
        assert!(reg.set(h, 5.0).is_err());
        assert_eq!(reg.get(h), 0.0);
    }

    #[test]
    fn set_rejects_out_of_range() {
        let mut reg = Registry::new();
        let h = reg
            .register("BL02:RW", PvKind::AnalogOutput, 0.0, 10.0)
            .unwrap();
        assert!(reg.set(h, -0.001).is_err());
        assert!(reg.set(h, 10.001).is_err());
        assert!(reg.set(h, 0.0).is_ok());
        assert!(reg.set(h, 10.0).is_ok());
    }

    #[test]
    fn mono_energy_mirrors_readback() {
        let mut reg = Registry::new();
        let sp = reg
            .register_with_writable("BL02:MONO:ENERGY", PvKind::AnalogOutput, 4000.0, 20000.0, true)
            .unwrap();
        reg.register_with_writable(
            "BL02:MONO:ENERGY.RBV",
            PvKind::AnalogInput,
            4000.0,
            20000.0,
            false,
        )
        .unwrap();
        reg.set(sp, 7112.0).unwrap();
        let rbv = reg.find("BL02:MONO:ENERGY.RBV").unwrap();
        assert_eq!(reg.get(rbv), 7112.0);
    }

    #[test]
    fn glob_matches_star_patterns() {
        assert!(glob_match("", "BL02:SAMPLE:X"));
        assert!(glob_match("*", "BL02:SAMPLE:X"));
        assert!(glob_match("BL02:SAMPLE:*", "BL02:SAMPLE:X"));
        assert!(glob_match("BL02:*:X", "BL02:SAMPLE:X"));
        assert!(!glob_match("BL02:*:Y", "BL02:SAMPLE:X"));
        assert!(glob_match("*:X", "BL02:SAMPLE:X"));
        assert!(glob_match("BL02*ENERGY", "BL02:MONO:ENERGY"));
        assert!(!glob_match("BL02:SAMPLE:X", "BL02:SAMPLE:XX"));
        assert!(glob_match("BL02:*:*", "BL02:SAMPLE:X"));
        assert!(glob_match("*MONO*ENERGY*", "BL02:MONO:ENERGY.RBV"));
    }

    #[test]
    fn list_truncates_to_whole_names() {
        let mut reg = Registry::new();
        reg.register("BL02:AAAA", PvKind::AnalogInput, 0.0, 1.0)
            .unwrap();
        reg.register("BL02:BBBB", PvKind::AnalogInput, 0.0, 1.0)
            .unwrap();
        let full = reg.list(None, 64);
        assert_eq!(full, "BL02:AAAA,BL02:BBBB");
        let truncated = reg.list(None, 9);
        assert_eq!(truncated, "BL02:AAAA");
    }
}
