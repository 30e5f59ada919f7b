// ABOUTME: TabSeparatedWithNames encoding and decoding for ClickHouse HTTP payloads
// ABOUTME: Escapes embedded newlines as backslash-newline so rows never split

/// Escape one field for ClickHouse TSV input.
///
/// Newlines become a backslash followed by the newline itself, which
/// ClickHouse reads back as a single embedded newline.
pub fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Encode a header row plus data rows. Every row, including the last, ends
/// with a newline.
pub fn encode<S: AsRef<str>>(columns: &[S], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    write_row(&mut out, columns.iter().map(|c| c.as_ref()));
    for row in rows {
        write_row(&mut out, row.iter().map(String::as_str));
    }
    out
}

fn write_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push('\t');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

/// Parse TSV text (with or without a header row) into rows of unescaped fields.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let next = chars
                    .next()
                    .ok_or_else(|| "dangling escape at end of input".to_string())?;
                match next {
                    'n' | '\n' => current.push('\n'),
                    't' => current.push('\t'),
                    'r' => current.push('\r'),
                    '0' => current.push('\0'),
                    'b' => current.push('\u{8}'),
                    'f' => current.push('\u{c}'),
                    '\\' | '\'' => current.push(next),
                    other => {
                        current.push('\\');
                        current.push(other);
                    }
                }
            }
            '\t' => fields.push(std::mem::take(&mut current)),
            '\n' => {
                fields.push(std::mem::take(&mut current));
                rows.push(std::mem::take(&mut fields));
            }
            other => current.push(other),
        }
    }

    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        rows.push(fields);
    }

    Ok(rows)
}
