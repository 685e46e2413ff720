//! Parse helpers shared by the `squashtar-cli` binaries.

use std::{ffi::CString, num::ParseIntError};

use squashtar::compression::Compressor;

pub fn parse_block_size(arg: &str) -> Result<u32, String> {
    let multiplier = if arg.ends_with('K') {
        1024
    } else if arg.ends_with('M') {
        1024 * 1024
    } else {
        1
    };
    arg.trim_end_matches(['K', 'M'])
        .parse::<u32>()
        .map(|out| out * multiplier)
        .map_err(|e| format!("invalid block size {arg}: {e}"))
}

pub fn parse_compressor(arg: &str) -> Result<Compressor, &'static str> {
    match arg {
        "gzip" => Ok(Compressor::Gzip),
        "lzo" => Ok(Compressor::Lzo),
        "lz4" => Ok(Compressor::Lz4),
        "xz" => Ok(Compressor::Xz),
        "zstd" => Ok(Compressor::Zstd),
        _ => Err("invalid compressor! possible values are: gzip, lzo, lz4, xz, zstd"),
    }
}

pub fn parse_octal(arg: &str) -> Result<u32, ParseIntError> {
    u32::from_str_radix(arg, 8)
}

pub fn parse_uid(arg: &str) -> Result<u32, String> {
    match arg.parse::<u32>() {
        Ok(uid) => Ok(uid),
        #[cfg(target_family = "unix")]
        Err(_) => {
            let name = CString::new(arg).map_err(|_| format!("invalid uid or username {arg}"))?;
            let passwd = unsafe { libc::getpwnam(name.as_ptr()) };
            if passwd.is_null() {
                return Err(format!("invalid uid or username {arg}"));
            }
            Ok(unsafe { (*passwd).pw_uid })
        }
        #[cfg(not(target_family = "unix"))]
        Err(e) => Err(format!("invalid uid {arg}: {e}")),
    }
}

pub fn parse_gid(arg: &str) -> Result<u32, String> {
    match arg.parse::<u32>() {
        Ok(gid) => Ok(gid),
        #[cfg(target_family = "unix")]
        Err(_) => {
            let name = CString::new(arg).map_err(|_| format!("invalid gid or group name {arg}"))?;
            let grp = unsafe { libc::getgrnam(name.as_ptr()) };
            if grp.is_null() {
                return Err(format!("invalid gid or group name {arg}"));
            }
            Ok(unsafe { (*grp).gr_gid })
        }
        #[cfg(not(target_family = "unix"))]
        Err(e) => Err(format!("invalid gid {arg}: {e}")),
    }
}
