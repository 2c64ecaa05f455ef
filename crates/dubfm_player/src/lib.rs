//! dubfm_player - 网络电台播放引擎
//!
//! 连接 HTTP/ICY 音频流，解码并输出到系统音频设备，
//! 通过 [`PlayerListener`] 回报状态和曲目名。

mod command;
mod decoder;
mod engine;
mod icy;
mod output;
mod stream;

pub use command::*;
pub use decoder::*;
pub use engine::*;
pub use icy::*;
pub use output::*;
pub use stream::*;
