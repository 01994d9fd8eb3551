/// PostgreSQL identifier check for configured table and column names.
pub fn validate_pg_identifier(name: &str) -> Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("identifier must not be empty".to_string());
    };

    if name.len() > 63 {
        return Err(format!(
            "identifier '{}' exceeds PostgreSQL maximum length of 63 bytes (got {})",
            name,
            name.len()
        ));
    }

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "identifier must start with a letter or underscore, got '{first}'"
        ));
    }

    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(format!("identifier '{name}' contains invalid character '{ch}'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_table_names() {
        assert!(validate_pg_identifier("ts_ws_task_record_US").is_ok());
        assert!(validate_pg_identifier("_x1").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_pg_identifier("").is_err());
        assert!(validate_pg_identifier("1abc").is_err());
        assert!(validate_pg_identifier("a-b").is_err());
        assert!(validate_pg_identifier(&"a".repeat(64)).is_err());
    }
}
