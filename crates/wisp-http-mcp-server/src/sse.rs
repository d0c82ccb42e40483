//! SSE framing: `id: <request-id-or-blank>\nevent: <name>\ndata: <json>\n\n`.

use wisp_mcp_server::Frame;

/// Format one frame for the wire. A frame without a payload emits an empty
/// `""` data line.
pub fn format_frame(frame: &Frame) -> String {
    let id = frame
        .id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let data = match &frame.data {
        Some(data) => data.to_string(),
        None => "\"\"".to_string(),
    };
    format!("id: {}\nevent: {}\ndata: {}\n\n", id, frame.event.name(), data)
}
