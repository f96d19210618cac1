//! Namespacing of upstream tool/resource/prompt names into one flat id
//! space: `<upstream><SEP><original-name>` (spec §4.2).

/// Separator between the upstream name and the original item name. Chosen
/// to be unlikely to appear in a tool name while staying visually distinct;
/// upstream names are restricted to `^[A-Za-z][A-Za-z0-9_-]{0,49}$` so this
/// never collides with a legal upstream name.
pub const SEPARATOR: &str = "__mcp__";

/// Build a namespaced id: `my-server__mcp__get_weather`.
pub fn encode(upstream_name: &str, item_name: &str) -> String {
    format!("{}{}{}", upstream_name, SEPARATOR, item_name)
}

/// Split a namespaced id back into `(upstream_name, item_name)`.
pub fn decode(namespaced: &str) -> Option<(&str, &str)> {
    namespaced.split_once(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let encoded = encode("weather-server", "get_forecast");
        assert_eq!(decode(&encoded), Some(("weather-server", "get_forecast")));
    }

    #[test]
    fn decode_rejects_id_without_separator() {
        assert_eq!(decode("not-namespaced"), None);
    }

    #[test]
    fn decode_uses_first_separator_occurrence() {
        // upstream names can't contain the separator, but item names might
        // coincidentally look similar; decode must split on the first hit.
        let encoded = encode("srv", "a__mcp__b");
        assert_eq!(decode(&encoded), Some(("srv", "a__mcp__b")));
    }
}
