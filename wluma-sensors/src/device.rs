// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Raw sysfs node reads and writes.
//!
//! sysfs attribute files hold one short decimal value. Reads are positional
//! (`pread` at offset 0) so the same open descriptor can be polled every
//! cycle. Writes truncate to zero first and then write the decimal string
//! at offset 0 — some backlight drivers misbehave when successive values
//! accumulate within one open file, so the sequence is exactly truncate,
//! write, nothing else.

use std::os::fd::AsFd;

use thiserror::Error;

/// Longest attribute value read from a node.
const READ_BUF_LEN: usize = 50;

/// Errors from a single node access.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The underlying system call failed.
    #[error("device i/o failed: {0}")]
    Io(#[from] rustix::io::Errno),
    /// The node content is not a number.
    #[error("device node does not contain a number: {0:?}")]
    Parse(String),
}

/// Reads the node's content at offset 0 and parses it as a float.
pub fn read_f64<Fd: AsFd>(fd: Fd) -> Result<f64, DeviceError> {
    let mut buf = [0u8; READ_BUF_LEN];
    let n = rustix::io::pread(fd, &mut buf, 0)?;
    let content = String::from_utf8_lossy(&buf[..n]);
    content
        .trim()
        .parse()
        .map_err(|_| DeviceError::Parse(content.into_owned()))
}

/// Truncates the node to zero length and writes `value` as decimal at
/// offset 0.
pub fn write_decimal<Fd: AsFd>(fd: Fd, value: u64) -> Result<(), DeviceError> {
    rustix::fs::ftruncate(fd.as_fd(), 0)?;
    rustix::io::pwrite(fd.as_fd(), value.to_string().as_bytes(), 0)?;
    Ok(())
}
