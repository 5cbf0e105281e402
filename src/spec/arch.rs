//! Platform families, target operating systems, and architectures
//!
//! A build description groups its overrides by host platform family
//! (win32/linux/darwin); under each family one or more target operating
//! systems are declared, each with its own architecture matrix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host operating-system family a build runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    /// Windows hosts
    Win32,
    /// Linux hosts
    Linux,
    /// macOS hosts
    Darwin,
}

impl PlatformFamily {
    /// The family of the current process host
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            PlatformFamily::Win32
        } else if cfg!(target_os = "macos") {
            PlatformFamily::Darwin
        } else {
            PlatformFamily::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Win32 => "win32",
            PlatformFamily::Linux => "linux",
            PlatformFamily::Darwin => "darwin",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win32" => Ok(PlatformFamily::Win32),
            "linux" => Ok(PlatformFamily::Linux),
            "darwin" => Ok(PlatformFamily::Darwin),
            _ => Err(format!("unknown platform family `{}`", s)),
        }
    }
}

/// Target operating system for a build
///
/// Variants are declared in name order so the derived `Ord` (and any
/// sorted map keyed by `OsName`) iterates alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsName {
    Android,
    Linux,
    Macos,
    Windows,
}

impl OsName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Android => "android",
            OsName::Linux => "linux",
            OsName::Macos => "macos",
        }
    }
}

impl fmt::Display for OsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows" => Ok(OsName::Windows),
            "android" => Ok(OsName::Android),
            "linux" => Ok(OsName::Linux),
            "macos" => Ok(OsName::Macos),
            _ => Err(format!("unknown target os `{}`", s)),
        }
    }
}

/// CPU architecture for a target plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x64")]
    X64,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    #[serde(rename = "universal")]
    Universal,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
            Arch::ArmeabiV7a => "armeabi-v7a",
            Arch::Arm64V8a => "arm64-v8a",
            Arch::Universal => "universal",
        }
    }

    /// Whether this architecture is a valid member of the given target
    /// OS's matrix.
    pub fn allowed_for(&self, os: OsName) -> bool {
        match os {
            OsName::Android => matches!(
                self,
                Arch::X86 | Arch::X86_64 | Arch::ArmeabiV7a | Arch::Arm64V8a
            ),
            OsName::Windows => matches!(self, Arch::X86 | Arch::X64 | Arch::Arm64),
            OsName::Linux => matches!(self, Arch::X86 | Arch::X64 | Arch::X86_64 | Arch::Arm64),
            OsName::Macos => matches!(self, Arch::X64 | Arch::Arm64 | Arch::Universal),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(Arch::X86),
            "x64" => Ok(Arch::X64),
            "x86_64" => Ok(Arch::X86_64),
            "arm64" => Ok(Arch::Arm64),
            "armeabi-v7a" => Ok(Arch::ArmeabiV7a),
            "arm64-v8a" => Ok(Arch::Arm64V8a),
            "universal" => Ok(Arch::Universal),
            _ => Err(format!("unknown architecture `{}`", s)),
        }
    }
}
