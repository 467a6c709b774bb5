//! Incremental frame decoders for the three streaming wire formats.
//!
//! Decoders are fed raw network reads in order and return what became
//! decodable. They never fail: a frame that does not parse is forwarded as
//! raw text so one bad frame cannot abort a stream.

use serde_json::Value;

/// Default end-of-stream sentinel for event-framed streams.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Wire framing of a backend's streaming body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line; `field` holds the text increment.
    JsonLines { field: String },
    /// Unframed text; every read is a fragment.
    RawText,
    /// `data: {...}` lines, optionally grouped into blank-line separated
    /// frames, ended by `sentinel`.
    EventStream { sentinel: String },
}

impl Framing {
    pub fn json_lines(field: impl Into<String>) -> Self {
        Self::JsonLines {
            field: field.into(),
        }
    }

    pub fn event_stream() -> Self {
        Self::EventStream {
            sentinel: DONE_SENTINEL.to_string(),
        }
    }
}

/// Output of a decoder step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Fragment(String),
    /// Explicit in-band end marker (the event-stream sentinel).
    Done,
}

#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    carry: Vec<u8>,
    /// Event-stream payload lines waiting for the rest of their JSON document.
    partial: Vec<String>,
    done: bool,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            carry: Vec::new(),
            partial: Vec::new(),
            done: false,
        }
    }

    /// True once the in-band sentinel was seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network read.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        if self.done || chunk.is_empty() {
            return Vec::new();
        }

        match &self.framing {
            Framing::RawText => {
                self.carry.extend_from_slice(chunk);
                let text = take_utf8(&mut self.carry, false);
                fragment(text).into_iter().collect()
            }
            Framing::JsonLines { .. } => {
                self.carry
                    .extend(chunk.iter().copied().filter(|b| *b != b'\r'));
                self.drain_lines()
            }
            Framing::EventStream { .. } => {
                self.carry
                    .extend(chunk.iter().copied().filter(|b| *b != b'\r'));
                self.drain_events()
            }
        }
    }

    /// Flush whatever is left once the transport ends.
    pub fn finish(&mut self) -> Vec<Decoded> {
        if self.done {
            self.carry.clear();
            return Vec::new();
        }
        if self.carry.is_empty() {
            return self.flush_partial();
        }

        let rest = take_utf8(&mut self.carry, true);
        match &self.framing {
            Framing::RawText => fragment(rest).into_iter().collect(),
            Framing::JsonLines { field } => decode_json_line(&rest, field)
                .map(Decoded::Fragment)
                .into_iter()
                .collect(),
            Framing::EventStream { .. } => {
                let mut out = self.decode_event_line(&rest);
                if !self.done {
                    out.extend(self.flush_partial());
                }
                out
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<Decoded> {
        let Framing::JsonLines { field } = &self.framing else {
            return Vec::new();
        };

        let mut out = Vec::new();
        while let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]);
            if let Some(text) = decode_json_line(&line, field) {
                out.push(Decoded::Fragment(text));
            }
        }
        out
    }

    fn drain_events(&mut self) -> Vec<Decoded> {
        let mut out = Vec::new();
        while let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]).into_owned();
            out.extend(self.decode_event_line(&line));
            if self.done {
                self.carry.clear();
                break;
            }
        }
        out
    }

    /// Decode one complete event-stream line. Each `data:` payload is decoded
    /// as soon as its line ends; payloads that are not JSON on their own are
    /// held until a following line completes them or the frame ends.
    fn decode_event_line(&mut self, line: &str) -> Vec<Decoded> {
        if line.is_empty() {
            return self.flush_partial();
        }
        if line.starts_with(':')
            || line.starts_with("event:")
            || line.starts_with("id:")
            || line.starts_with("retry:")
        {
            return Vec::new();
        }

        let payload = match line.strip_prefix("data:") {
            Some(data) => data.strip_prefix(' ').unwrap_or(data),
            None => line,
        };
        let is_sentinel = matches!(
            &self.framing,
            Framing::EventStream { sentinel } if payload.trim() == sentinel.as_str()
        );

        if is_sentinel {
            let mut out = self.flush_partial();
            self.done = true;
            out.push(Decoded::Done);
            return out;
        }

        if let Ok(value) = serde_json::from_str::<Value>(payload) {
            let mut out = self.flush_partial();
            out.extend(decode_chunk(&value));
            return out;
        }

        self.partial.push(payload.to_string());
        let joined = self.partial.join("\n");
        match serde_json::from_str::<Value>(&joined) {
            Ok(value) => {
                self.partial.clear();
                decode_chunk(&value)
            }
            Err(_) => Vec::new(),
        }
    }

    /// Forward held payload lines that never formed a JSON document.
    fn flush_partial(&mut self) -> Vec<Decoded> {
        if self.partial.is_empty() {
            return Vec::new();
        }
        let data = self.partial.join("\n");
        self.partial.clear();
        tracing::debug!(len = data.len(), "Malformed event frame, forwarding raw text");
        fragment(data).into_iter().collect()
    }
}

fn decode_chunk(value: &Value) -> Vec<Decoded> {
    if let Some(error) = value.get("error") {
        tracing::warn!(%error, "Backend reported an error frame");
    }
    delta_content(value).and_then(fragment).into_iter().collect()
}

fn fragment(text: String) -> Option<Decoded> {
    (!text.is_empty()).then_some(Decoded::Fragment(text))
}

/// `choices[0].delta.content` of a chat-completion chunk.
fn delta_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn decode_json_line(line: &str, field: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get(field) {
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            Some(Value::String(_)) | Some(Value::Null) => None,
            Some(other) => Some(other.to_string()),
            None => {
                if let Some(error) = map.get("error") {
                    tracing::warn!(%error, "Backend reported an error line");
                }
                Some(line.to_string())
            }
        },
        Ok(_) => Some(line.to_string()),
        Err(_) => {
            tracing::debug!(line_len = line.len(), "Non-JSON line, forwarding raw text");
            Some(line.to_string())
        }
    }
}

/// Take the decodable UTF-8 prefix of `buf`, leaving an incomplete trailing
/// sequence behind unless `flush` is set.
fn take_utf8(buf: &mut Vec<u8>, flush: bool) -> String {
    let (valid_up_to, incomplete_tail) = match std::str::from_utf8(buf) {
        Ok(_) => (buf.len(), false),
        Err(e) => (e.valid_up_to(), e.error_len().is_none()),
    };

    if incomplete_tail && !flush {
        let tail = buf.split_off(valid_up_to);
        let text = String::from_utf8_lossy(buf).into_owned();
        *buf = tail;
        return text;
    }

    let text = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    text
}
