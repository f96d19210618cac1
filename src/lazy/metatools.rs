//! Synthetic meta-tool definitions exposed instead of (or alongside) real
//! tool schemas in `metatool`/`hybrid` lazy-loading modes (spec §4.4).
//!
//! Not namespaced like upstream tools — these belong to the aggregator
//! itself, so their names can't collide with `<upstream>__mcp__<name>`
//! namespaced ids (which always contain `__mcp__`).

use serde_json::{json, Value};

pub const LIST_TOOLS: &str = "tool_list";
pub const TOOL_SCHEMA: &str = "tool_schema";
pub const TOOL_INVOKE: &str = "tool_invoke";

pub fn is_meta_tool(name: &str) -> bool {
    matches!(name, LIST_TOOLS | TOOL_SCHEMA | TOOL_INVOKE)
}

/// The three meta-tool definitions, returned from `tools/list` in place of
/// (metatool mode) or alongside (hybrid mode, schema-stripped) the real
/// tool set.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": LIST_TOOLS,
            "description": "List the names and descriptions of every tool available, without input schemas. Call tool_schema to fetch a specific tool's schema before invoking it.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        json!({
            "name": TOOL_SCHEMA,
            "description": "Fetch the full input schema for one tool by its namespaced name.",
            "inputSchema": {
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"],
            },
        }),
        json!({
            "name": TOOL_INVOKE,
            "description": "Invoke a tool by its namespaced name with the given arguments.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "arguments": { "type": "object" },
                },
                "required": ["name"],
            },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_meta_tool_names() {
        assert!(is_meta_tool(LIST_TOOLS));
        assert!(is_meta_tool(TOOL_SCHEMA));
        assert!(!is_meta_tool("weather__mcp__forecast"));
    }

    #[test]
    fn definitions_cover_all_three_names() {
        let defs = definitions();
        let names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(names, vec![LIST_TOOLS, TOOL_SCHEMA, TOOL_INVOKE]);
    }
}
