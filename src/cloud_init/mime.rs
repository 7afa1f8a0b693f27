//! Minimal `multipart/mixed` writer for cloud-init user-data.
//!
//! cloud-init dispatches each part by its `Content-Type`, so both parts are
//! tagged `text/cloud-config` and merged by cloud-init itself.

/// Boundary separating the parts of the combined document.
pub const MIME_BOUNDARY: &str = "DOCKERMACHINEMIMEBOUNDARY";

/// File name attached to the user-supplied part.
pub const USER_PART_NAME: &str = "custom-user-data.yaml";

/// File name attached to the generated bootstrap part.
pub const GENERATED_PART_NAME: &str = "yandex-machine-driver.yaml";

const PART_CONTENT_TYPE: &str = "text/cloud-config";

struct MultipartWriter {
    buffer: String,
    boundary: &'static str,
    parts: usize,
}

impl MultipartWriter {
    fn new(boundary: &'static str) -> Self {
        let mut buffer = String::new();
        buffer.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"
        ));
        buffer.push_str("MIME-Version: 1.0\r\n\r\n");
        Self {
            buffer,
            boundary,
            parts: 0,
        }
    }

    fn part(&mut self, file_name: &str, body: &str) {
        if self.parts > 0 {
            self.buffer.push_str("\r\n");
        }
        self.buffer.push_str(&format!("--{}\r\n", self.boundary));
        self.buffer.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n",
            escape_quotes(file_name)
        ));
        self.buffer
            .push_str(&format!("Content-Type: {PART_CONTENT_TYPE}\r\n\r\n"));
        self.buffer.push_str(&to_crlf(body));
        self.parts += 1;
    }

    fn finish(mut self) -> String {
        self.buffer
            .push_str(&format!("\r\n--{}--\r\n", self.boundary));
        self.buffer
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Converts bare `\n` line endings to `\r\n`, leaving existing CRLF intact.
fn to_crlf(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Combines a user-supplied cloud-config with the generated one.
///
/// The user part comes first and the generated part last, so cloud-init's
/// merge lets the generated SSH bootstrap take effect.
#[must_use]
pub fn combine_cloud_configs(user_document: &str, generated_document: &str) -> String {
    let mut writer = MultipartWriter::new(MIME_BOUNDARY);
    writer.part(USER_PART_NAME, user_document);
    writer.part(GENERATED_PART_NAME, generated_document);
    writer.finish()
}
