/// Splits one raw export line into fields. Both `,` and `;` act as
/// delimiters (the exports are not consistent about which they use) except
/// inside a double-quoted span. Quote state toggles on every `"`; the export
/// format has no escaping. Quotes are dropped and fields trimmed.
pub fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' | ';' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}
