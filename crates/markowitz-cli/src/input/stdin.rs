use std::io::{self, Read};

/// Read return-table text piped on stdin.
/// Returns None if stdin is a TTY (interactive) or nothing was piped.
pub fn read_stdin() -> Result<Option<String>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut bytes = Vec::new();
    io::stdin().read_to_end(&mut bytes)?;

    let text = String::from_utf8(bytes)
        .map_err(|_| "stdin is not valid UTF-8; re-encode the return table as UTF-8")?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}
