use ea_domain::stream::Delta;
use ea_domain::Error;

use crate::traits::BoxStream;

/// Split a growing buffer into complete `data:`-prefixed SSE blocks,
/// leaving any trailing partial block in `buffer` for the next chunk.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let Some(pos) = buffer.find("\n\n") else {
            break;
        };
        let block: String = buffer.drain(..pos + 2).collect();
        for line in block.lines() {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix("data:") {
                let data = rest.trim_start();
                if !data.is_empty() {
                    out.push(data.to_string());
                }
            }
        }
    }
    out
}

/// Build a `Delta` stream from a raw `reqwest::Response` body, feeding
/// each drained `data:` payload through `parse_data`. Flushes any
/// remaining partial buffer at stream end and synthesizes a fallback
/// `Delta::Done` if the parser never produced a terminal event.
pub(crate) fn sse_response_stream<F>(
    mut response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Delta>
where
    F: FnMut(&str) -> Option<Delta> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer = String::new();
        let mut saw_terminal = false;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                    for data in drain_data_lines(&mut buffer) {
                        if let Some(delta) = parse_data(&data) {
                            if matches!(delta, Delta::Done(_) | Delta::Error(_)) {
                                saw_terminal = true;
                            }
                            yield delta;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            if let Some(delta) = parse_data(&data) {
                                if matches!(delta, Delta::Done(_) | Delta::Error(_)) {
                                    saw_terminal = true;
                                }
                                yield delta;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Delta::Error(Error::BackendUnavailable(e.to_string()).to_string());
                    saw_terminal = true;
                    break;
                }
            }
        }

        if !saw_terminal {
            yield Delta::Done(Default::default());
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = "data: hello\n\n".to_string();
        let out = drain_data_lines(&mut buf);
        assert_eq!(out, vec!["hello".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut buf = "data: hel".to_string();
        let out = drain_data_lines(&mut buf);
        assert!(out.is_empty());
        assert_eq!(buf, "data: hel");
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = "data: one\n\ndata: two\n\n".to_string();
        let out = drain_data_lines(&mut buf);
        assert_eq!(out, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn drain_skips_empty_data_lines() {
        let mut buf = "data: \n\ndata: real\n\n".to_string();
        let out = drain_data_lines(&mut buf);
        assert_eq!(out, vec!["real".to_string()]);
    }

    #[test]
    fn drain_incremental_buffering() {
        let mut buf = String::new();
        buf.push_str("data: ab");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("c\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["abc".to_string()]);
    }
}
