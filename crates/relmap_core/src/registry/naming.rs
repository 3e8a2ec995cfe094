//! Name derivation rules of the registry.

/// Lower-cased name with every non-alphanumeric character removed.
///
/// Used to match fields to columns regardless of naming convention.
pub(crate) fn flatten(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// `employeeNo` -> `EMPLOYEE_NO`, `htmlURLValue` -> `HTML_URL_VALUE`.
pub(crate) fn upper_snake(name: &str) -> String {
    let chars = name.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(name.len() + 4);
    for (position, ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && position > 0 {
            let previous = chars[position - 1];
            let next_is_lower = chars
                .get(position + 1)
                .is_some_and(|next| next.is_ascii_lowercase());
            if previous.is_ascii_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_ascii_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.push(ch.to_ascii_uppercase());
    }
    out
}

pub(crate) fn sequence_name(entity: &str, field: &str) -> String {
    format!(
        "SEQ_{}_{}",
        entity.to_ascii_uppercase(),
        field.to_ascii_uppercase()
    )
}

pub(crate) fn index_name(entity: &str, fields: &[String]) -> String {
    let mut name = format!("IDX_{}", entity.to_ascii_uppercase());
    for field in fields {
        name.push('_');
        name.push_str(&field.to_ascii_uppercase());
    }
    name
}

pub(crate) fn audit_table_name(table: &str) -> String {
    format!("AUDIT_{table}")
}

#[cfg(test)]
mod tests {
    use super::{flatten, index_name, sequence_name, upper_snake};

    #[test]
    fn flatten_ignores_case_and_separators() {
        assert_eq!(flatten("EMP_NO"), "empno");
        assert_eq!(flatten("employeeNo"), "employeeno");
        assert_eq!(flatten("parent-id"), "parentid");
    }

    #[test]
    fn upper_snake_splits_camel_case() {
        assert_eq!(upper_snake("employeeNo"), "EMPLOYEE_NO");
        assert_eq!(upper_snake("id"), "ID");
        assert_eq!(upper_snake("htmlURLValue"), "HTML_URL_VALUE");
        assert_eq!(upper_snake("line2Text"), "LINE2_TEXT");
    }

    #[test]
    fn derived_names_use_upper_cased_parts() {
        assert_eq!(sequence_name("Address", "id"), "SEQ_ADDRESS_ID");
        assert_eq!(
            index_name("Employee", &["phoneNo".to_string(), "name".to_string()]),
            "IDX_EMPLOYEE_PHONENO_NAME"
        );
    }
}
