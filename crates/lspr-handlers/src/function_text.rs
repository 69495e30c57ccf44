//! Locating a function's source text by line
//!
//! Brace-delimited bodies are found by counting braces from the first line at
//! or after the given line that mentions the function name. Bodies introduced
//! by a trailing `:` (Python) end where indentation returns to the
//! declaration's level.

/// Inclusive 0-based line span of a function in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpan {
    pub start: usize,
    pub end: usize,
}

/// Find the span of `name` starting the search at 1-based `line`
pub fn find_function_span(content: &str, name: &str, line: u32) -> Option<FunctionSpan> {
    let lines: Vec<&str> = content.split('\n').collect();
    let first = (line as usize).checked_sub(1)?;
    if name.is_empty() {
        return None;
    }

    let start = (first..lines.len()).find(|&i| lines[i].contains(name))?;
    let header = lines[start].trim_end();
    if header.ends_with(':') && !header.contains('{') {
        return Some(FunctionSpan {
            start,
            end: indented_block_end(&lines, start),
        });
    }

    let mut depth: i64 = 0;
    let mut opened = false;
    for (i, text) in lines.iter().enumerate().skip(start) {
        for ch in text.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return Some(FunctionSpan { start, end: i });
        }
        if !opened && i == start && text.trim_end().ends_with(';') {
            return Some(FunctionSpan { start, end: i });
        }
    }

    // Unbalanced braces: take everything to the end of the document.
    Some(FunctionSpan {
        start,
        end: lines.len() - 1,
    })
}

/// Source text of function `name` found at or after 1-based `line`
pub fn extract_function_from_content(content: &str, name: &str, line: u32) -> Option<String> {
    let span = find_function_span(content, name, line)?;
    let lines: Vec<&str> = content.split('\n').collect();
    Some(lines[span.start..=span.end].join("\n"))
}

/// `content` with function `name` found at or after 1-based `line` removed.
/// Unchanged when the function cannot be found.
pub fn remove_function_from_content(content: &str, name: &str, line: u32) -> String {
    let Some(span) = find_function_span(content, name, line) else {
        return content.to_string();
    };
    let mut lines: Vec<&str> = content.split('\n').collect();
    lines.drain(span.start..=span.end);
    lines.join("\n")
}

fn indented_block_end(lines: &[&str], header: usize) -> usize {
    let base = indentation(lines[header]);
    let mut end = header;
    for (i, text) in lines.iter().enumerate().skip(header + 1) {
        if text.trim().is_empty() {
            continue;
        }
        if indentation(text) <= base {
            break;
        }
        end = i;
    }
    end
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}
