use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::Arc;

use dlopen::wrapper::{Container, WrapperApi};

use super::{ResourceManager, Session, VisaOptions, WRITE_TERMINATION};
use labctl_protocol::{VisaError, VisaResult};

cfg_if::cfg_if! {
    if #[cfg(all(windows, target_pointer_width = "64"))] {
        const DEFAULT_VISA_LIB: &str = "visa64.dll";
    } else if #[cfg(windows)] {
        const DEFAULT_VISA_LIB: &str = "visa32.dll";
    } else if #[cfg(target_os = "macos")] {
        const DEFAULT_VISA_LIB: &str = "/Library/Frameworks/VISA.framework/VISA";
    } else {
        const DEFAULT_VISA_LIB: &str = "libvisa.so";
    }
}

type ViStatus = i32;
type ViAccessMode = u32;
type ViSession = u32;
type ViObject = u32;
type ViFindList = u32;

const VI_SUCCESS_MAX_CNT: ViStatus = 0x3FFF0006;
const VI_ERROR_RSRC_NFOUND: ViStatus = 0xBFFF0011_u32 as ViStatus;
const VI_ERROR_INV_RSRC_NAME: ViStatus = 0xBFFF0012_u32 as ViStatus;
const VI_ERROR_IO: ViStatus = 0xBFFF003E_u32 as ViStatus;
const VI_ERROR_LIBRARY_NFOUND: ViStatus = 0xBFFF009E_u32 as ViStatus;
const VI_NO_LOCK: ViAccessMode = 0;
const VI_FIND_BUFLEN: usize = 256;
const READ_CHUNK: usize = 1024;

/// Matches every instrument resource, same as the default of most VISA front ends.
const FIND_EXPR: &[u8] = b"?*::INSTR\0";

#[derive(WrapperApi)]
struct Api {
    viOpenDefaultRM: unsafe extern "system" fn(vi: *mut ViSession) -> ViStatus,
    viFindRsrc: unsafe extern "system" fn(session: ViSession, expr: *const c_char,
                                          find_list: *mut ViFindList, ret_cnt: *mut u32,
                                          desc: *mut c_char) -> ViStatus,
    viFindNext: unsafe extern "system" fn(find_list: ViFindList, desc: *mut c_char) -> ViStatus,
    viOpen: unsafe extern "system" fn(session: ViSession, rsrc: *const c_char,
                                      access_mode: ViAccessMode, timeout: u32, vi: *mut ViSession) -> ViStatus,
    viClose: extern "system" fn(vi: ViObject) -> ViStatus,
    viRead: unsafe extern "system" fn(vi: ViSession, buf: *mut u8, cnt: u32, ret_cnt: *mut u32) -> ViStatus,
    viWrite: unsafe extern "system" fn(vi: ViSession, buf: *const u8, cnt: u32, ret_cnt: *mut u32) -> ViStatus,
    viStatusDesc: unsafe extern "system" fn(vi: ViObject, status: ViStatus, desc: *mut c_char) -> ViStatus,
}

fn describe_status(api: &Container<Api>, vi: ViObject, status: ViStatus) -> String {
    let mut data = [0 as c_char; VI_FIND_BUFLEN];
    let ret = unsafe { api.viStatusDesc(vi, status, data.as_mut_ptr()) };
    if ret < 0 {
        return "Unknown VISA status".to_string();
    }
    to_string(&data)
}

fn to_string(buf: &[c_char]) -> String {
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Default resource manager of the system VISA library.
pub struct Visa {
    api: Arc<Container<Api>>,
    rm: ViSession,
}

impl Visa {
    pub fn new() -> VisaResult<Self> {
        Self::with_options(&VisaOptions::default())
    }

    pub fn with_options(options: &VisaOptions) -> VisaResult<Self> {
        let path = options
            .library
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VISA_LIB));
        log::debug!("Loading VISA library from `{}`", path.display());
        let api: Container<Api> = unsafe { Container::load(&path) }.map_err(|err| {
            VisaError::new(
                VI_ERROR_LIBRARY_NFOUND,
                format!("Cannot load `{}`: {}", path.display(), err),
            )
        })?;
        let mut rm: ViSession = 0;
        let status = unsafe { api.viOpenDefaultRM(&mut rm) };
        if status < 0 {
            return Err(VisaError::new(
                status,
                "Could not open the default resource manager",
            ));
        }
        Ok(Visa {
            api: Arc::new(api),
            rm,
        })
    }

    fn error(&self, status: ViStatus) -> VisaError {
        VisaError::new(status, describe_status(&self.api, self.rm, status))
    }
}

impl ResourceManager for Visa {
    type Session = VisaSession;

    fn list_resources(&self) -> VisaResult<Vec<String>> {
        let mut find_list: ViFindList = 0;
        let mut count = 0_u32;
        let mut desc = [0 as c_char; VI_FIND_BUFLEN];
        let status = unsafe {
            self.api.viFindRsrc(
                self.rm,
                FIND_EXPR.as_ptr() as *const c_char,
                &mut find_list,
                &mut count,
                desc.as_mut_ptr(),
            )
        };
        if status == VI_ERROR_RSRC_NFOUND {
            return Ok(Vec::new());
        }
        if status < 0 {
            return Err(self.error(status));
        }

        let mut ret = Vec::with_capacity(count as usize);
        ret.push(to_string(&desc));
        for _ in 1..count {
            let status = unsafe { self.api.viFindNext(find_list, desc.as_mut_ptr()) };
            if status < 0 {
                self.api.viClose(find_list);
                return Err(self.error(status));
            }
            ret.push(to_string(&desc));
        }
        self.api.viClose(find_list);
        Ok(ret)
    }

    fn open_resource(&self, resource: &str) -> VisaResult<VisaSession> {
        let cstr = CString::new(resource).map_err(|_| {
            VisaError::new(VI_ERROR_INV_RSRC_NAME, "Resource name contains a NUL byte")
        })?;
        let mut vi: ViSession = 0;
        let status = unsafe { self.api.viOpen(self.rm, cstr.as_ptr(), VI_NO_LOCK, 0, &mut vi) };
        if status < 0 {
            return Err(self.error(status));
        }
        Ok(VisaSession {
            api: self.api.clone(),
            vi,
            resource: resource.to_string(),
            closed: false,
        })
    }
}

impl Drop for Visa {
    fn drop(&mut self) {
        let status = self.api.viClose(self.rm);
        if status < 0 {
            log::error!("Error closing resource manager: {}", self.error(status));
        }
    }
}

/// An open session to a single instrument. The session is closed when dropped.
pub struct VisaSession {
    api: Arc<Container<Api>>,
    vi: ViSession,
    resource: String,
    closed: bool,
}

impl VisaSession {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn error(&self, status: ViStatus) -> VisaError {
        VisaError::new(status, describe_status(&self.api, self.vi, status))
    }

    fn read(&mut self) -> VisaResult<Vec<u8>> {
        let mut ret = Vec::new();
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            let mut actually_read = 0_u32;
            let status = unsafe {
                self.api
                    .viRead(self.vi, chunk.as_mut_ptr(), READ_CHUNK as u32, &mut actually_read)
            };
            if status < 0 {
                return Err(self.error(status));
            }
            ret.extend_from_slice(&chunk[..actually_read as usize]);
            if status != VI_SUCCESS_MAX_CNT {
                return Ok(ret);
            }
        }
    }
}

impl Session for VisaSession {
    fn write(&mut self, msg: &str) -> VisaResult<()> {
        let data = format!("{}{}", msg, WRITE_TERMINATION).into_bytes();
        let mut offset = 0;
        while offset < data.len() {
            let mut actually_written = 0_u32;
            let remaining = &data[offset..];
            let status = unsafe {
                self.api.viWrite(
                    self.vi,
                    remaining.as_ptr(),
                    remaining.len() as u32,
                    &mut actually_written,
                )
            };
            if status < 0 {
                return Err(self.error(status));
            }
            if actually_written == 0 {
                return Err(VisaError::new(VI_ERROR_IO, "Instrument accepted no data"));
            }
            offset += actually_written as usize;
        }
        Ok(())
    }

    fn query(&mut self, msg: &str) -> VisaResult<String> {
        self.write(msg)?;
        let data = self.read()?;
        let ret = String::from_utf8_lossy(&data);
        Ok(ret.trim_end_matches(|c| c == '\r' || c == '\n').to_string())
    }

    fn close(mut self) -> VisaResult<()> {
        self.closed = true;
        let status = self.api.viClose(self.vi);
        if status < 0 {
            Err(self.error(status))
        } else {
            Ok(())
        }
    }
}

impl Drop for VisaSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let status = self.api.viClose(self.vi);
        if status < 0 {
            log::error!("Error closing `{}`: {}", self.resource, self.error(status));
        }
    }
}
