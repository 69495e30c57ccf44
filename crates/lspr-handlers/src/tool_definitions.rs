//! Schemas of the public tools, as listed by `tools/list`

use lspr_foundation::model::mcp::McpTool;
use serde_json::{json, Value};

/// Every public tool name
pub const PUBLIC_TOOLS: &[&str] = &[
    "rename_file",
    "move_function",
    "extract_function",
    "find_references",
    "rename_symbol",
];

/// Definitions of all public tools, in listing order
pub fn get_all_tool_definitions() -> Vec<McpTool> {
    vec![
        tool(
            "rename_file",
            "Rename a file or folder using LSP rename capabilities",
            json!({
                "type": "object",
                "properties": {
                    "oldPath": { "type": "string", "description": "Current path of the file or folder" },
                    "newPath": { "type": "string", "description": "New path for the file or folder" },
                    "language": language_property("Programming language (typescript, javascript, python, etc.)"),
                },
                "required": ["oldPath", "newPath"],
            }),
        ),
        tool(
            "move_function",
            "Move a function to a different file using LSP refactoring",
            json!({
                "type": "object",
                "properties": {
                    "sourceFile": { "type": "string", "description": "Source file containing the function" },
                    "targetFile": { "type": "string", "description": "Target file to move the function to" },
                    "functionName": { "type": "string", "description": "Name of the function to move" },
                    "line": { "type": "number", "description": "Line number where the function is located" },
                    "character": { "type": "number", "description": "Character position where the function starts", "default": 0 },
                    "language": language_property("Programming language"),
                },
                "required": ["sourceFile", "targetFile", "functionName", "line"],
            }),
        ),
        tool(
            "extract_function",
            "Extract selected code into a new function",
            json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "File containing the code to extract" },
                    "startLine": { "type": "number", "description": "Start line of code to extract" },
                    "startCharacter": { "type": "number", "description": "Start character position", "default": 0 },
                    "endLine": { "type": "number", "description": "End line of code to extract" },
                    "endCharacter": { "type": "number", "description": "End character position", "default": 0 },
                    "functionName": { "type": "string", "description": "Name for the new function" },
                    "language": language_property("Programming language"),
                },
                "required": ["file", "startLine", "endLine", "functionName"],
            }),
        ),
        tool(
            "find_references",
            "Find all references to a symbol using LSP",
            json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "File containing the symbol" },
                    "line": { "type": "number", "description": "Line number of the symbol" },
                    "character": { "type": "number", "description": "Character position of the symbol", "default": 0 },
                    "language": language_property("Programming language"),
                },
                "required": ["file", "line"],
            }),
        ),
        tool(
            "rename_symbol",
            "Rename a symbol (variable, function, class, etc.) across all files",
            json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "File containing the symbol" },
                    "line": { "type": "number", "description": "Line number of the symbol" },
                    "character": { "type": "number", "description": "Character position of the symbol", "default": 0 },
                    "newName": { "type": "string", "description": "New name for the symbol" },
                    "language": language_property("Programming language"),
                },
                "required": ["file", "line", "newName"],
            }),
        ),
    ]
}

/// Check if a tool name is in the public tool list
pub fn is_public_tool(name: &str) -> bool {
    PUBLIC_TOOLS.contains(&name)
}

fn tool(name: &str, description: &str, input_schema: Value) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn language_property(description: &str) -> Value {
    json!({ "type": "string", "description": description, "default": "typescript" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_match_public_list() {
        let names: Vec<String> = get_all_tool_definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, PUBLIC_TOOLS);
    }

    #[test]
    fn test_required_fields_are_declared_properties() {
        for tool in get_all_tool_definitions() {
            let properties = tool.input_schema["properties"].as_object().unwrap();
            for required in tool.input_schema["required"].as_array().unwrap() {
                let field = required.as_str().unwrap();
                assert!(
                    properties.contains_key(field),
                    "{} requires undeclared field {}",
                    tool.name,
                    field
                );
            }
        }
    }

    #[test]
    fn test_public_tool_lookup() {
        assert!(is_public_tool("rename_symbol"));
        assert!(!is_public_tool("delete_everything"));
    }
}
