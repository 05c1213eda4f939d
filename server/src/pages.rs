//! Server-side rendering of the index and settings pages.

use campi_core::panel::Measurements;
use campi_core::CameraState;

const PAGE_TOP: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Camera Pi</title></head>
<body style="text-align:center; font-size:xx-large">
<h1>Camera Pi Streaming</h1>
"#;

const PAGE_STREAM: &str = r#"<img src="/stream.mjpg" width="100%" alt="live stream" />
<br><br>
"#;

const PAGE_END: &str = r#"</body>
</html>
"#;

fn control_button(name: &str, label: &str, enabled: bool) -> String {
    format!(
        "<button class=\"control\" type=\"submit\" name=\"{}\" value=\"1\"{}>{}</button>\n",
        name,
        if enabled { "" } else { " disabled" },
        label
    )
}

/// Start/stop button pair: start is enabled only while idle, stop only
/// while recording; both disabled in the transitional states.
fn control_form(state: CameraState) -> String {
    let mut html = String::from("<form action=\"/settings.html\" method=\"post\">\n");
    html.push_str(&control_button("start", "Start recording", state.is_idle()));
    html.push_str(&control_button("stop", "Stop recording", state.is_recording()));
    html.push_str("</form>\n<br>\n");
    html
}

fn measurement_list(measurements: &Measurements) -> String {
    let mut html = String::new();
    for (key, value) in measurements {
        html.push_str(&format!(
            "<div class=\"measurement\">{}: {}</div>\n",
            key, value
        ));
    }
    html
}

pub fn render_index(
    state: CameraState,
    measurements: &Measurements,
    show_stream: bool,
) -> String {
    let mut html = String::from(PAGE_TOP);
    if show_stream {
        html.push_str(PAGE_STREAM);
    }
    html.push_str(&control_form(state));
    html.push_str(&measurement_list(measurements));
    html.push_str(PAGE_END);
    html
}

pub fn render_settings(state: CameraState, base_path: &str, can_write: bool) -> String {
    let mut html = String::from(PAGE_TOP);
    html.push_str("<h2>Settings</h2>\n");
    html.push_str(&control_form(state));
    html.push_str(&format!(
        "<div class=\"storage\">Recordings base: {}</div>\n",
        base_path
    ));
    if !can_write {
        html.push_str("<div class=\"storage-warning\">Recordings base is not writable!</div>\n");
    }
    html.push_str(PAGE_END);
    html
}
