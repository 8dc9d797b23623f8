// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Fault categories that can latch the error envelope.
///
/// These are reported through [`crate::envelope::ErrorEnvelope::trigger`], never
/// propagated with `?` past the worker that detected them — by the time a
/// worker is running inside its own `tokio::spawn`, there is no caller left to
/// hand a `Result` back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortFault {
    GpioSetup,
    GpioIo,
    FrameSource,
    ConfigError,
    Internal,
}

impl SortFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GpioSetup => "GPIO_SETUP",
            Self::GpioIo => "GPIO_IO",
            Self::FrameSource => "FRAME_SOURCE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for SortFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
