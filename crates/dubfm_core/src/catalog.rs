//! 电台流目录
//!
//! 同一电台的四个固定码率，按码率从低到高排列。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// 码率档位
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Kbps24,
    Kbps64,
    #[default]
    Kbps128,
    Kbps256,
}

impl Bitrate {
    pub const ALL: [Bitrate; 4] = [
        Bitrate::Kbps24,
        Bitrate::Kbps64,
        Bitrate::Kbps128,
        Bitrate::Kbps256,
    ];

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps24 => 24,
            Bitrate::Kbps64 => 64,
            Bitrate::Kbps128 => 128,
            Bitrate::Kbps256 => 256,
        }
    }

    pub fn from_kbps(kbps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.kbps() == kbps)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kbps())
    }
}

impl FromStr for Bitrate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().trim_end_matches("kbps").trim();
        label
            .parse::<u32>()
            .ok()
            .and_then(Bitrate::from_kbps)
            .ok_or_else(|| CoreError::UnknownBitrate(s.to_string()))
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = CoreError;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        Bitrate::from_kbps(kbps).ok_or_else(|| CoreError::UnknownBitrate(kbps.to_string()))
    }
}

impl From<Bitrate> for u32 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.kbps()
    }
}

/// 一个可播放的流端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream {
    pub bitrate: Bitrate,
    pub url: &'static str,
}

pub const STREAMS: [Stream; 4] = [
    Stream {
        bitrate: Bitrate::Kbps24,
        url: "http://stream.dubstep.fm/24mp3",
    },
    Stream {
        bitrate: Bitrate::Kbps64,
        url: "http://stream.dubstep.fm/64mp3",
    },
    Stream {
        bitrate: Bitrate::Kbps128,
        url: "http://stream.dubstep.fm/128mp3",
    },
    Stream {
        bitrate: Bitrate::Kbps256,
        url: "http://stream.dubstep.fm/256mp3",
    },
];

pub fn stream(bitrate: Bitrate) -> &'static Stream {
    match bitrate {
        Bitrate::Kbps24 => &STREAMS[0],
        Bitrate::Kbps64 => &STREAMS[1],
        Bitrate::Kbps128 => &STREAMS[2],
        Bitrate::Kbps256 => &STREAMS[3],
    }
}

pub fn find_by_url(url: &str) -> Option<&'static Stream> {
    let url = url.trim();
    STREAMS.iter().find(|s| s.url == url)
}
