//! ICY 元数据解复用
//!
//! Shoutcast/Icecast 在音频字节流中每隔 `icy-metaint` 字节插入一个元数据块：
//! 1 字节长度（乘以 16），随后是 `StreamTitle='...';` 形式的文本，以 NUL 填充。

const TITLE_KEY: &str = "StreamTitle='";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// 音频字节，距下一个元数据块还剩 `until_meta` 字节
    Audio,
    /// 下一个字节是元数据长度
    Length,
    /// 元数据块内，还剩 `remaining` 字节
    Meta { remaining: usize },
}

/// 增量式 ICY 解复用器，可以接受任意切分的网络块
#[derive(Debug)]
pub struct IcyDemuxer {
    metaint: usize,
    until_meta: usize,
    state: DemuxState,
    meta_buf: Vec<u8>,
    last_title: Option<String>,
}

impl IcyDemuxer {
    /// `metaint == 0` 表示服务器不插入元数据，所有字节直接透传
    pub fn new(metaint: usize) -> Self {
        Self {
            metaint,
            until_meta: metaint,
            state: DemuxState::Audio,
            meta_buf: Vec::new(),
            last_title: None,
        }
    }

    /// 处理一个网络块：音频字节追加到 `audio`，返回本块中新出现的曲目名
    ///
    /// 与上一个曲目名相同的标题不会重复返回。
    pub fn feed(&mut self, input: &[u8], audio: &mut Vec<u8>) -> Vec<String> {
        let mut titles = Vec::new();

        if self.metaint == 0 {
            audio.extend_from_slice(input);
            return titles;
        }

        let mut pos = 0;
        while pos < input.len() {
            match self.state {
                DemuxState::Audio => {
                    let n = self.until_meta.min(input.len() - pos);
                    audio.extend_from_slice(&input[pos..pos + n]);
                    self.until_meta -= n;
                    pos += n;
                    if self.until_meta == 0 {
                        self.state = DemuxState::Length;
                    }
                }
                DemuxState::Length => {
                    let len = input[pos] as usize * 16;
                    pos += 1;
                    if len == 0 {
                        self.resume_audio();
                    } else {
                        self.meta_buf.clear();
                        self.state = DemuxState::Meta { remaining: len };
                    }
                }
                DemuxState::Meta { remaining } => {
                    let n = remaining.min(input.len() - pos);
                    self.meta_buf.extend_from_slice(&input[pos..pos + n]);
                    pos += n;
                    if remaining == n {
                        if let Some(title) = parse_stream_title(&self.meta_buf) {
                            if self.last_title.as_deref() != Some(title.as_str()) {
                                self.last_title = Some(title.clone());
                                titles.push(title);
                            }
                        }
                        self.resume_audio();
                    } else {
                        self.state = DemuxState::Meta {
                            remaining: remaining - n,
                        };
                    }
                }
            }
        }

        titles
    }

    fn resume_audio(&mut self) {
        self.until_meta = self.metaint;
        self.state = DemuxState::Audio;
    }
}

/// 从元数据块中提取 `StreamTitle`，空标题返回 `None`
pub fn parse_stream_title(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let text = text.trim_end_matches('\0');

    let start = text.find(TITLE_KEY)? + TITLE_KEY.len();
    let rest = &text[start..];
    // 标题本身可能包含单引号，以 `';` 作为结束符，缺失时退回到最后一个引号
    let end = rest.find("';").or_else(|| rest.rfind('\''))?;

    let title = rest[..end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_block(text: &str) -> Vec<u8> {
        let blocks = text.len().div_ceil(16);
        let mut out = vec![blocks as u8];
        out.extend_from_slice(text.as_bytes());
        out.resize(1 + blocks * 16, 0);
        out
    }

    fn icy_stream(metaint: usize) -> (Vec<u8>, Vec<u8>) {
        let audio: Vec<u8> = (0..metaint as u32 * 3).map(|i| (i % 251) as u8).collect();
        let mut wire = Vec::new();
        let chunks: Vec<_> = audio.chunks(metaint).collect();
        wire.extend_from_slice(chunks[0]);
        wire.extend(meta_block("StreamTitle='First Tune';StreamUrl='';"));
        wire.extend_from_slice(chunks[1]);
        wire.push(0);
        wire.extend_from_slice(chunks[2]);
        wire.extend(meta_block("StreamTitle='Second Tune';"));
        (wire, audio)
    }

    #[test]
    fn test_parse_stream_title() {
        assert_eq!(
            parse_stream_title(b"StreamTitle='Skream - Midnight Request Line';StreamUrl='';\0\0"),
            Some("Skream - Midnight Request Line".to_string())
        );
        assert_eq!(
            parse_stream_title(b"StreamTitle='Rock 'n' Roll';"),
            Some("Rock 'n' Roll".to_string())
        );
        assert_eq!(parse_stream_title(b"StreamTitle='';"), None);
        assert_eq!(parse_stream_title(b"StreamUrl='http://x';"), None);
    }

    #[test]
    fn test_demux_whole_stream() {
        let (wire, audio) = icy_stream(64);
        let mut demux = IcyDemuxer::new(64);
        let mut out = Vec::new();

        let titles = demux.feed(&wire, &mut out);

        assert_eq!(out, audio);
        assert_eq!(titles, vec!["First Tune".to_string(), "Second Tune".to_string()]);
    }

    #[test]
    fn test_demux_byte_by_byte() {
        let (wire, audio) = icy_stream(48);
        let mut demux = IcyDemuxer::new(48);
        let mut out = Vec::new();
        let mut titles = Vec::new();

        for byte in wire.chunks(1) {
            titles.extend(demux.feed(byte, &mut out));
        }

        assert_eq!(out, audio);
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn test_demux_repeated_title_reported_once() {
        let mut wire = vec![1u8; 16];
        wire.extend(meta_block("StreamTitle='Same';"));
        wire.extend(vec![2u8; 16]);
        wire.extend(meta_block("StreamTitle='Same';"));

        let mut demux = IcyDemuxer::new(16);
        let mut out = Vec::new();
        let titles = demux.feed(&wire, &mut out);

        assert_eq!(titles, vec!["Same".to_string()]);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_demux_passthrough_without_metaint() {
        let mut demux = IcyDemuxer::new(0);
        let mut out = Vec::new();
        assert!(demux.feed(b"StreamTitle='x';", &mut out).is_empty());
        assert_eq!(out, b"StreamTitle='x';");
    }
}
