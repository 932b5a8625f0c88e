use super::document::{Category, Document, Layout};
use super::Value;

impl Document {
    /// Renders the document back to CIF text.
    ///
    /// Source text of unmodified categories, comments and whitespace is copied
    /// unchanged. A `loop_` that gained rows keeps its original text and gets
    /// the new rows appended after its last value; a key/value category that
    /// gained rows is rewritten as a `loop_`. Categories created in memory are
    /// appended at the end of their block.
    pub fn to_cif_string(&self) -> String {
        let source = self.source.as_str();
        let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };
        let mut out = String::with_capacity(source.len() + 512);
        let mut cursor = 0;
        let mut changed = false;

        for block in self.blocks() {
            for category in block.categories() {
                let Some(origin) = category.origin else {
                    continue;
                };
                if !category.is_modified() {
                    continue;
                }
                changed = true;
                let mut chunk = String::new();
                match origin.layout {
                    Layout::Loop => {
                        let insert_at = end_of_line(source, origin.end);
                        out.push_str(&source[cursor..insert_at]);
                        cursor = insert_at;
                        let widths = column_widths(category);
                        for row in &category.rows()[origin.rows..] {
                            chunk.push('\n');
                            render_row(&mut chunk, row, &widths);
                        }
                    }
                    Layout::Pairs => {
                        out.push_str(&source[cursor..origin.start]);
                        cursor = origin.end;
                        render_loop(&mut chunk, category);
                    }
                }
                push_lines(&mut out, &chunk, newline);
            }

            let mut fresh = block
                .categories()
                .iter()
                .filter(|c| c.origin.is_none())
                .peekable();
            if fresh.peek().is_some() {
                changed = true;
                out.push_str(&source[cursor..block.end]);
                cursor = block.end;
                let mut chunk = String::new();
                for category in fresh {
                    chunk.push_str("\n#\n");
                    if category.layout() == Layout::Pairs && category.len() == 1 {
                        render_pairs(&mut chunk, category);
                    } else {
                        render_loop(&mut chunk, category);
                    }
                }
                push_lines(&mut out, &chunk, newline);
            }
        }

        out.push_str(&source[cursor..]);
        if changed && !out.ends_with('\n') {
            out.push_str(newline);
        }
        out
    }
}

/// Appends rendered text, switching its line breaks to those of the source.
fn push_lines(out: &mut String, chunk: &str, newline: &str) {
    if newline == "\n" {
        out.push_str(chunk);
    } else {
        out.push_str(&chunk.replace('\n', newline));
    }
}

/// Moves `pos` past trailing blanks and a comment on the same line, so that
/// appended rows do not split them off the row they belong to.
fn end_of_line(source: &str, pos: usize) -> usize {
    let rest = &source[pos..];
    let line = rest.split('\n').next().unwrap_or_default();
    let line = line.strip_suffix('\r').unwrap_or(line);
    let tail = line.trim_start_matches([' ', '\t']);
    if tail.is_empty() || tail.starts_with('#') {
        pos + line.len()
    } else {
        pos
    }
}

fn render_pairs(out: &mut String, category: &Category) {
    let tags: Vec<String> = category.tags().collect();
    let width = tags.iter().map(String::len).max().unwrap_or(0);
    for (i, (tag, value)) in tags.iter().zip(&category.rows()[0]).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let value = format_value(value);
        if value.starts_with(';') {
            out.push_str(tag);
            out.push('\n');
            out.push_str(&value);
        } else {
            out.push_str(&format!("{tag:<width$} {value}"));
        }
    }
}

fn render_loop(out: &mut String, category: &Category) {
    out.push_str("loop_");
    for tag in category.tags() {
        out.push('\n');
        out.push_str(&tag);
    }
    let widths = column_widths(category);
    for row in category.rows() {
        out.push('\n');
        render_row(out, row, &widths);
    }
}

/// Writes one loop row without a trailing newline. Text fields go on lines of
/// their own.
fn render_row(out: &mut String, row: &[Value], widths: &[usize]) {
    let mut line = String::new();
    for (value, width) in row.iter().zip(widths) {
        let value = format_value(value);
        if value.starts_with(';') {
            if !line.trim_end().is_empty() {
                out.push_str(line.trim_end());
                out.push('\n');
            }
            line.clear();
            out.push_str(&value);
            out.push('\n');
        } else {
            line.push_str(&format!("{value:<width$} "));
        }
    }
    let line = line.trim_end();
    if line.is_empty() {
        // Row ended on a text field; drop the newline pushed after it
        if out.ends_with('\n') {
            out.pop();
        }
    } else {
        out.push_str(line);
    }
}

fn column_widths(category: &Category) -> Vec<usize> {
    let mut widths = vec![0; category.fields().len()];
    for row in category.rows() {
        for (width, value) in widths.iter_mut().zip(row) {
            let value = format_value(value);
            if !value.starts_with(';') {
                *width = (*width).max(value.chars().count());
            }
        }
    }
    widths
}

/// Quotes a value so that it reads back as the same value.
pub(crate) fn format_value(value: &Value) -> String {
    let text = match value {
        Value::Unknown => return "?".to_string(),
        Value::Inapplicable => return ".".to_string(),
        Value::Text(text) => text,
    };

    if text.contains('\n') || text.contains('\r') {
        return format!(";{text}\n;");
    }
    if !needs_quotes(text) {
        return text.clone();
    }
    if !closes_quote(text, '\'') {
        format!("'{text}'")
    } else if !closes_quote(text, '"') {
        format!("\"{text}\"")
    } else {
        format!(";{text}\n;")
    }
}

fn needs_quotes(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    text.is_empty()
        || text == "?"
        || text == "."
        || text.chars().any(char::is_whitespace)
        || text.starts_with(['_', '#', '$', '\'', '"', '[', ']', ';'])
        || ["data_", "loop_", "save_", "global_", "stop_"]
            .iter()
            .any(|kw| lower.starts_with(kw))
}

/// True when `quote` followed by whitespace occurs inside `text`, which
/// would end a string delimited by `quote` early.
fn closes_quote(text: &str, quote: char) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == quote && chars.peek().is_some_and(|next| next.is_whitespace()) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOPED: &str = "data_2G10
#
loop_
_struct_asym.id
_struct_asym.pdbx_blank_PDB_chainid_flag
_struct_asym.pdbx_modified
_struct_asym.entity_id
_struct_asym.details
A N N 1 ?
B N N 2 ?
#
_atom_site.id 1
";

    fn water_row(id: &str, entity: &str) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::text(id)),
            ("entity_id", Value::text(entity)),
            ("pdbx_blank_PDB_chainid_flag", Value::text("N")),
            ("pdbx_modified", Value::text("N")),
            ("details", Value::Unknown),
        ]
    }

    #[test]
    fn untouched_document_is_reproduced_exactly() {
        let src = "data_x\n# note\n_a.b   'two words'  # trailing\nloop_\n_c.d\n;text\nfield\n;\n";
        let doc = Document::parse(src).unwrap();
        assert_eq!(doc.to_cif_string(), src);
    }

    #[test]
    fn rows_are_appended_after_the_original_loop() {
        let mut doc = Document::parse(LOOPED).unwrap();
        doc.first_block_mut()
            .category_mut("_struct_asym")
            .unwrap()
            .push_record(&water_row("C", "3"));

        let expected = LOOPED.replace("B N N 2 ?\n", "B N N 2 ?\nC N N 3 ?\n");
        assert_eq!(doc.to_cif_string(), expected);
    }

    #[test]
    fn pairs_category_is_rewritten_as_loop() {
        let src = "data_1ABC\n_struct_asym.id A\n_struct_asym.entity_id 1\n#\n";
        let mut doc = Document::parse(src).unwrap();
        doc.first_block_mut()
            .category_mut("_struct_asym")
            .unwrap()
            .push_record(&water_row("B", "2"));

        assert_eq!(
            doc.to_cif_string(),
            "data_1ABC\nloop_\n_struct_asym.id\n_struct_asym.entity_id\nA 1\nB 2\n#\n"
        );
    }

    #[test]
    fn new_category_goes_to_block_end() {
        let src = "data_1ABC\n_entry.id 1ABC";
        let mut doc = Document::parse(src).unwrap();
        let mut category = Category::new("_struct_asym", ["id", "entity_id"]);
        category.push_record(&water_row("A", "1"));
        doc.first_block_mut().push_category(category);

        assert_eq!(
            doc.to_cif_string(),
            "data_1ABC\n_entry.id 1ABC\n#\nloop_\n_struct_asym.id\n_struct_asym.entity_id\nA 1\n"
        );
    }

    #[test]
    fn appended_rows_are_padded_to_column_width() {
        let src = "data_x\nloop_\n_s.id\n_s.entity_id\nAA 10\nB 2\n";
        let mut doc = Document::parse(src).unwrap();
        doc.first_block_mut()
            .category_mut("_s")
            .unwrap()
            .push_record(&[("id", Value::text("C")), ("entity_id", Value::text("3"))]);
        assert_eq!(
            doc.to_cif_string(),
            "data_x\nloop_\n_s.id\n_s.entity_id\nAA 10\nB 2\nC  3\n"
        );
    }

    #[test]
    fn trailing_blanks_stay_on_their_row() {
        let src = "data_x\nloop_\n_s.id\n_s.entity_id\nA 1 \nB 2 # last\n#\n";
        let mut doc = Document::parse(src).unwrap();
        doc.first_block_mut()
            .category_mut("_s")
            .unwrap()
            .push_record(&[("id", Value::text("C")), ("entity_id", Value::text("3"))]);
        assert_eq!(
            doc.to_cif_string(),
            "data_x\nloop_\n_s.id\n_s.entity_id\nA 1 \nB 2 # last\nC 3\n#\n"
        );
    }

    #[test]
    fn appended_rows_follow_crlf_line_endings() {
        let src = "data_x\r\nloop_\r\n_s.id\r\n_s.entity_id\r\nA 1\r\n#\r\n";
        let mut doc = Document::parse(src).unwrap();
        doc.first_block_mut()
            .category_mut("_s")
            .unwrap()
            .push_record(&[("id", Value::text("B")), ("entity_id", Value::text("2"))]);
        assert_eq!(
            doc.to_cif_string(),
            "data_x\r\nloop_\r\n_s.id\r\n_s.entity_id\r\nA 1\r\nB 2\r\n#\r\n"
        );
    }

    #[test]
    fn leading_byte_order_mark_is_kept() {
        let src = "\u{feff}data_x\nloop_\n_s.id\n_s.entity_id\nA 1\n";
        let mut doc = Document::parse(src).unwrap();
        assert_eq!(doc.first_block().name(), "x");
        assert_eq!(doc.to_cif_string(), src);

        doc.first_block_mut()
            .category_mut("_s")
            .unwrap()
            .push_record(&[("id", Value::text("B")), ("entity_id", Value::text("2"))]);
        assert_eq!(
            doc.to_cif_string(),
            "\u{feff}data_x\nloop_\n_s.id\n_s.entity_id\nA 1\nB 2\n"
        );
    }

    #[test]
    fn values_are_quoted_when_needed() {
        assert_eq!(format_value(&Value::text("HOH")), "HOH");
        assert_eq!(format_value(&Value::Unknown), "?");
        assert_eq!(format_value(&Value::Inapplicable), ".");
        assert_eq!(format_value(&Value::text("?")), "'?'");
        assert_eq!(format_value(&Value::text("")), "''");
        assert_eq!(format_value(&Value::text("water molecule")), "'water molecule'");
        assert_eq!(format_value(&Value::text("O5'")), "O5'");
        assert_eq!(format_value(&Value::text("it' s")), "\"it' s\"");
        assert_eq!(format_value(&Value::text("_tag")), "'_tag'");
        assert_eq!(format_value(&Value::text("a\nb")), ";a\nb\n;");
    }

    #[test]
    fn formatted_values_read_back_unchanged() {
        let values = ["plain", "two words", "?", "it' s", "'quoted'", "multi\nline", "data_x"];
        let mut category = Category::new("_t", ["v"]);
        for v in values {
            category.push_record(&[("v", Value::text(v))]);
        }
        let mut out = String::from("data_t\n");
        render_loop(&mut out, &category);
        out.push('\n');

        let doc = Document::parse(out).unwrap();
        let parsed: Vec<_> = doc
            .first_block()
            .category("_t")
            .unwrap()
            .column("v")
            .unwrap()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(parsed, values);
    }
}
