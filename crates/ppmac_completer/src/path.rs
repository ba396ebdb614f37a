use crate::error::CompleterError;

/// One dotted component of a variable path, e.g. `Motor[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    /// `Some("")` for a bare `[]`
    pub index: Option<String>,
}

/// Splits `Motor[1].Servo.Kp` into segments. Dots inside brackets do not
/// split, so `Coord[L0.1].Q` keeps its index expression.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, CompleterError> {
    let invalid = || CompleterError::InvalidPath(path.to_string());
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            '.' if depth == 0 => {
                segments.push(parse_segment(&path[start..i]).ok_or_else(invalid)?);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(invalid());
    }

    segments.push(parse_segment(&path[start..]).ok_or_else(invalid)?);
    Ok(segments)
}

fn parse_segment(text: &str) -> Option<PathSegment> {
    let text = text.trim();
    let (name, index) = match text.find('[') {
        Some(open) => {
            let inner = text[open + 1..].strip_suffix(']')?;
            (&text[..open], Some(inner.trim().to_string()))
        }
        None => (text, None),
    };

    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| PathSegment {
        name: name.to_string(),
        index,
    })
}
