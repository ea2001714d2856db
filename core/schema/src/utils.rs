// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

/// `stream_in_request` -> `StreamInRequest`
pub fn snake_to_camel(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `ExampleService` -> `example_service`, `HTTPServer` -> `http_server`
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev != '_' && (prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Whether `name` is a valid identifier in the generated schema.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("ping"), "Ping");
        assert_eq!(snake_to_camel("stream_in_request"), "StreamInRequest");
        assert_eq!(snake_to_camel("item_counts"), "ItemCounts");
        assert_eq!(snake_to_camel("itemCount"), "ItemCount");
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("ExampleService"), "example_service");
        assert_eq!(camel_to_snake("HTTPServer"), "http_server");
        assert_eq!(camel_to_snake("Ping2Service"), "ping2_service");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("ping"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1ping"));
        assert!(!is_identifier("ping-pong"));
        assert!(!is_identifier(""));
    }
}
