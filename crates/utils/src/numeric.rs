/// Parses a locale-ambiguous numeric token into a signed double. Never
/// errors: empty strings and the `-`/`--` placeholders broker exports use
/// for "no value" come back as 0.0, as does anything unparseable.
///
/// Separator rules:
/// - apostrophes (Swiss thousands separators) and whitespace are stripped
///   first;
/// - a comma with no dot is a decimal separator ("1234,56");
/// - when both appear, the one later in the string is the decimal separator
///   and the earlier one is a thousands separator to drop, so "1.234,56" and
///   "1,234.56" both parse to 1234.56;
/// - finally every character that is not a digit, a dot, or a leading minus
///   is stripped (currency symbols, stray letters).
pub fn parse_numeric(s: &str) -> f64 {
    let mut t: String = s
        .chars()
        .filter(|c| *c != '\'' && !c.is_whitespace())
        .collect();

    if t.is_empty() || t == "-" || t == "--" {
        return 0.0;
    }

    match (t.rfind(','), t.rfind('.')) {
        (Some(_), None) => {
            t = t.replace(',', ".");
        }
        (Some(comma), Some(dot)) => {
            if comma > dot {
                t = t.replace('.', "").replace(',', ".");
            } else {
                t = t.replace(',', "");
            }
        }
        _ => {}
    }

    let negative = t.starts_with('-');
    let digits: String = t
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let value = digits.parse::<f64>().unwrap_or(0.0);
    if negative {
        -value
    } else {
        value
    }
}
