//! In-process resource manager simulating SCPI instruments.
//!
//! Every listed instrument remembers the last `INST`, `VOLT`, `CURR` and `OUTP` setting written
//! to it and reports them back on the matching query, so a write followed by a query behaves
//! like a real power supply. All clones of a `Loopback` share the same instruments, which allows
//! to inspect the traffic after handing a clone to an instrument wrapper.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ResourceManager, Session};
use labctl_protocol::{VisaError, VisaResult};

const VI_ERROR_TMO: i32 = 0xBFFF0015_u32 as i32;
const VI_ERROR_RSRC_NFOUND: i32 = 0xBFFF0011_u32 as i32;
const VI_ERROR_RSRC_BUSY: i32 = 0xBFFF0072_u32 as i32;

pub const DEFAULT_IDN: &str = "LABCTL,LOOPBACK,0,1.0";

struct LoopbackInstrument {
    idn: String,
    reachable: bool,
    channel: String,
    voltage: String,
    current: String,
    output: bool,
    commands: Vec<String>,
    open_sessions: usize,
}

impl LoopbackInstrument {
    fn new(idn: &str, reachable: bool) -> Self {
        Self {
            idn: idn.to_string(),
            reachable,
            channel: "P6V".to_string(),
            voltage: "0".to_string(),
            current: "0".to_string(),
            output: false,
            commands: Vec::new(),
            open_sessions: 0,
        }
    }

    fn write(&mut self, msg: &str) {
        self.commands.push(msg.to_string());
        let (header, arg) = match msg.trim().split_once(' ') {
            Some((header, arg)) => (header.to_uppercase(), arg.trim().to_string()),
            None => return,
        };
        match header.as_str() {
            "OUTP" => match arg.to_uppercase().as_str() {
                "ON" | "1" => self.output = true,
                "OFF" | "0" => self.output = false,
                _ => {}
            },
            "INST" => self.channel = arg,
            "VOLT" => self.voltage = arg,
            "CURR" => self.current = arg,
            _ => {}
        }
    }

    fn query(&mut self, msg: &str) -> Option<String> {
        self.commands.push(msg.to_string());
        let ret = match msg.trim().to_uppercase().as_str() {
            "*IDN?" => self.idn.clone(),
            "INST?" => self.channel.clone(),
            "VOLT?" => self.voltage.clone(),
            "CURR?" => self.current.clone(),
            "OUTP?" => (if self.output { "1" } else { "0" }).to_string(),
            _ => return None,
        };
        Some(ret)
    }
}

struct LoopbackShared {
    resources: Vec<String>,
    instruments: HashMap<String, LoopbackInstrument>,
}

#[derive(Clone)]
pub struct Loopback(Arc<Mutex<LoopbackShared>>);

impl Loopback {
    pub fn new() -> Self {
        let inner = LoopbackShared {
            resources: Vec::new(),
            instruments: HashMap::new(),
        };
        Self(Arc::new(Mutex::new(inner)))
    }

    /// List `resource` and answer `*IDN?` with `idn`.
    pub fn with_instrument(self, resource: &str, idn: &str) -> Self {
        self.insert(resource, LoopbackInstrument::new(idn, true));
        self
    }

    /// List `resource` but fail every attempt to open it.
    pub fn with_unreachable(self, resource: &str) -> Self {
        self.insert(resource, LoopbackInstrument::new(DEFAULT_IDN, false));
        self
    }

    fn insert(&self, resource: &str, instrument: LoopbackInstrument) {
        let mut inner = self.lock();
        if inner
            .instruments
            .insert(resource.to_lowercase(), instrument)
            .is_none()
        {
            inner.resources.push(resource.to_string());
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackShared> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All messages written to `resource`, queries included, in order.
    pub fn commands(&self, resource: &str) -> Vec<String> {
        self.lock()
            .instruments
            .get(&resource.to_lowercase())
            .map(|x| x.commands.clone())
            .unwrap_or_default()
    }

    pub fn output(&self, resource: &str) -> Option<bool> {
        self.lock()
            .instruments
            .get(&resource.to_lowercase())
            .map(|x| x.output)
    }

    pub fn open_sessions(&self, resource: &str) -> usize {
        self.lock()
            .instruments
            .get(&resource.to_lowercase())
            .map(|x| x.open_sessions)
            .unwrap_or(0)
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager for Loopback {
    type Session = LoopbackSession;

    fn list_resources(&self) -> VisaResult<Vec<String>> {
        Ok(self.lock().resources.clone())
    }

    fn open_resource(&self, resource: &str) -> VisaResult<LoopbackSession> {
        let key = resource.to_lowercase();
        let mut inner = self.lock();
        let instrument = inner.instruments.get_mut(&key).ok_or_else(|| {
            VisaError::new(
                VI_ERROR_RSRC_NFOUND,
                "Insufficient location information or the requested device or resource is not present in the system.",
            )
        })?;
        if !instrument.reachable {
            return Err(VisaError::new(
                VI_ERROR_RSRC_BUSY,
                "The resource is valid, but VISA cannot currently access it.",
            ));
        }
        instrument.open_sessions += 1;
        Ok(LoopbackSession {
            loopback: self.clone(),
            key,
        })
    }
}

pub struct LoopbackSession {
    loopback: Loopback,
    key: String,
}

impl LoopbackSession {
    fn access<R, F: FnOnce(&mut LoopbackInstrument) -> R>(&self, f: F) -> VisaResult<R> {
        let mut inner = self.loopback.lock();
        let instrument = inner
            .instruments
            .get_mut(&self.key)
            .ok_or_else(|| VisaError::new(VI_ERROR_RSRC_NFOUND, "Instrument vanished"))?;
        Ok(f(instrument))
    }
}

impl Session for LoopbackSession {
    fn write(&mut self, msg: &str) -> VisaResult<()> {
        self.access(|x| x.write(msg))
    }

    fn query(&mut self, msg: &str) -> VisaResult<String> {
        self.access(|x| x.query(msg))?.ok_or_else(|| {
            VisaError::new(VI_ERROR_TMO, "Timeout expired before operation completed.")
        })
    }

    fn close(self) -> VisaResult<()> {
        Ok(())
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        let _ = self.access(|x| x.open_sessions = x.open_sessions.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS: &str = "GPIB0::7::INSTR";

    #[test]
    fn lists_in_declared_order() {
        let rm = Loopback::new()
            .with_instrument("TCPIP0::10.1.1.1::inst0::INSTR", DEFAULT_IDN)
            .with_unreachable("GPIB0::5::INSTR")
            .with_instrument(PS, DEFAULT_IDN);
        assert_eq!(
            rm.list_resources().unwrap(),
            vec!["TCPIP0::10.1.1.1::inst0::INSTR", "GPIB0::5::INSTR", PS]
        );
    }

    #[test]
    fn echoes_settings() {
        let rm = Loopback::new().with_instrument(PS, "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0");
        let mut session = rm.open_resource("gpib0::7::instr").unwrap();
        assert_eq!(session.query("*IDN?").unwrap(), "HEWLETT-PACKARD,E3631A,0,2.1-5.0-1.0");
        session.write("INST P25V").unwrap();
        session.write("VOLT 5").unwrap();
        session.write("OUTP ON").unwrap();
        assert_eq!(session.query("INST?").unwrap(), "P25V");
        assert_eq!(session.query("VOLT?").unwrap(), "5");
        assert_eq!(rm.output(PS), Some(true));
        assert_eq!(rm.commands(PS).len(), 6);

        let err = session.query("MEAS:VOLT?").unwrap_err();
        assert_eq!(err.code, VI_ERROR_TMO);
    }

    #[test]
    fn tracks_sessions() {
        let rm = Loopback::new().with_instrument(PS, DEFAULT_IDN);
        let session = rm.open_resource(PS).unwrap();
        assert_eq!(rm.open_sessions(PS), 1);
        session.close().unwrap();
        assert_eq!(rm.open_sessions(PS), 0);
    }

    #[test]
    fn open_failures() {
        let rm = Loopback::new().with_unreachable(PS);
        assert_eq!(rm.open_resource(PS).err().unwrap().code, VI_ERROR_RSRC_BUSY);
        assert_eq!(
            rm.open_resource("GPIB0::1::INSTR").err().unwrap().code,
            VI_ERROR_RSRC_NFOUND
        );
    }
}
