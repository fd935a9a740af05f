//! SSE stream parsing for OpenAI-compatible streaming responses.

use futures::{Stream, StreamExt};

use dealroom_core::{Error, Result, TokenStream};

use super::types::ChatCompletionChunk;

/// Parse an SSE byte stream from an OpenAI-compatible endpoint into tokens.
pub fn parse_sse_stream(
    stream: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> TokenStream {
    let token_stream = stream
        .map(|chunk_result| chunk_result.map_err(|e| Error::Model(format!("Stream error: {}", e))))
        .filter_map(|result| async move {
            match result {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    parse_sse_chunk(&text)
                }
                Err(e) => Some(Err(e)),
            }
        });

    Box::pin(token_stream)
}

/// Parse a single SSE chunk and extract token content.
fn parse_sse_chunk(chunk: &str) -> Option<Result<String>> {
    let mut content = String::new();

    for line in chunk.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        // End of stream marker
        if line == "data: [DONE]" {
            return None;
        }

        if let Some(data) = line.strip_prefix("data: ") {
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(chunk) => {
                    for choice in chunk.choices {
                        if let Some(c) = choice.delta.content {
                            content.push_str(&c);
                        }
                    }
                }
                Err(e) => {
                    return Some(Err(Error::Model(format!(
                        "Failed to parse SSE chunk: {}",
                        e
                    ))));
                }
            }
        }
    }

    if content.is_empty() {
        None
    } else {
        Some(Ok(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_chunk_with_content() {
        let chunk = r#"data: {"id":"test","choices":[{"index":0,"delta":{"content":"ARR grew"},"finish_reason":null}]}"#;
        let result = parse_sse_chunk(chunk);
        assert_eq!(result.unwrap().unwrap(), "ARR grew");
    }

    #[test]
    fn test_parse_sse_chunk_done() {
        assert!(parse_sse_chunk("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_sse_chunk_empty_delta() {
        let chunk =
            r#"data: {"id":"test","choices":[{"index":0,"delta":{},"finish_reason":null}]}"#;
        assert!(parse_sse_chunk(chunk).is_none());
    }

    #[test]
    fn test_parse_sse_chunk_role_only() {
        let chunk = r#"data: {"id":"test","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert!(parse_sse_chunk(chunk).is_none());
    }

    #[test]
    fn test_parse_sse_chunk_comment_and_empty() {
        assert!(parse_sse_chunk(": keep-alive").is_none());
        assert!(parse_sse_chunk("").is_none());
    }

    #[test]
    fn test_parse_sse_chunk_multiple_lines() {
        let chunk = r#"data: {"id":"test","choices":[{"index":0,"delta":{"content":"45%"},"finish_reason":null}]}

data: {"id":"test","choices":[{"index":0,"delta":{"content":" YoY"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_chunk(chunk).unwrap().unwrap(), "45% YoY");
    }

    #[test]
    fn test_parse_sse_chunk_invalid_json() {
        let result = parse_sse_chunk("data: {invalid json}");
        assert!(result.unwrap().is_err());
    }
}
