//! Constant and constructor naming
//!
//! Native libraries prefix constructor and constant names with the upper
//! snake form of the owning type (`FooBar` -> `FOO_BAR_`).

/// `FooBar` -> `FOO_BAR_`
pub fn pp_prefix(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    for (i, c) in type_name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_uppercase());
    }
    out.push('_');
    out
}

/// `name` without `prefix`, or unchanged when it doesn't carry it
pub fn strip_prefix<'a>(name: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(p) => name.strip_prefix(p).unwrap_or(name),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pp_prefix() {
        assert_eq!(pp_prefix("FooBar"), "FOO_BAR_");
        assert_eq!(pp_prefix("PgfExpr"), "PGF_EXPR_");
        assert_eq!(pp_prefix("x"), "X_");
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("FOO_BAR_LIT", Some("FOO_BAR_")), "LIT");
        assert_eq!(strip_prefix("OTHER", Some("FOO_BAR_")), "OTHER");
        assert_eq!(strip_prefix("FOO_BAR_LIT", None), "FOO_BAR_LIT");
    }
}
