/// 將子程序的原始輸出切成完整的行
///
/// 編碼器以 `\r` 覆寫同一行進度，因此 `\r` 與 `\n` 都視為行尾。
/// 未結束的最後一段保留在緩衝區，等待下一批資料。
#[derive(Debug, Default)]
pub struct LineStream {
    pending: Vec<u8>,
}

impl LineStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 取出所有完整的非空行
    pub fn drain_lines(&mut self) -> Vec<String> {
        let Some(last_break) = self.pending.iter().rposition(|b| matches!(b, b'\n' | b'\r'))
        else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_break + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|b| matches!(b, b'\n' | b'\r'))
            .filter_map(Self::decode)
            .collect()
    }

    /// 程序結束後取出剩餘的片段
    pub fn finish(&mut self) -> Vec<String> {
        let mut lines = self.drain_lines();
        let rest = std::mem::take(&mut self.pending);
        if let Some(line) = Self::decode(&rest) {
            lines.push(line);
        }
        lines
    }

    fn decode(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut stream = LineStream::new();
        stream.push(b"[ 10.0%] 10/100 fra");
        assert!(stream.drain_lines().is_empty());

        stream.push(b"mes\r[ 20.0%] 20/100");
        assert_eq!(stream.drain_lines(), vec!["[ 10.0%] 10/100 frames"]);
        assert!(stream.has_pending());
    }

    #[test]
    fn test_crlf_and_blank_lines_are_skipped() {
        let mut stream = LineStream::new();
        stream.push(b"first\r\n\r\nsecond\n   \nthird\r");
        assert_eq!(stream.drain_lines(), vec!["first", "second", "third"]);
        assert!(!stream.has_pending());
    }

    #[test]
    fn test_finish_flushes_unterminated_tail() {
        let mut stream = LineStream::new();
        stream.push(b"encoded 100 frames\nx264 [info]: kb/s:1000");
        assert_eq!(
            stream.finish(),
            vec!["encoded 100 frames", "x264 [info]: kb/s:1000"]
        );
        assert!(stream.finish().is_empty());
    }
}
