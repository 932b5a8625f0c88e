use super::lexer::{Lexer, Token, TokenKind};
use super::Value;
use crate::error::Error;
use std::iter::Peekable;

/// How a category is laid out in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One `_category.field value` line per field; always a single row
    Pairs,
    /// A `loop_` table
    Loop,
}

/// Where a parsed category came from, used by the writer to copy it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Origin {
    pub start: usize,
    pub end: usize,
    pub rows: usize,
    pub layout: Layout,
}

/// A named table inside a data block, e.g. `_struct_asym`.
#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    fields: Vec<String>,
    rows: Vec<Vec<Value>>,
    layout: Layout,
    pub(crate) origin: Option<Origin>,
}

impl Category {
    /// Creates an empty `loop_` category that does not exist in any source file yet.
    pub fn new<S: Into<String>>(name: &str, fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            layout: Layout::Loop,
            origin: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `field` among the category's fields (case-insensitive).
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.eq_ignore_ascii_case(field))
    }

    /// All values of one field, in row order.
    pub fn column<'a>(&'a self, field: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.field_index(field)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Appends a row given as `(field, value)` pairs.
    ///
    /// Declared fields missing from `record` are written as `?`; pairs naming a
    /// field the category does not declare are dropped and their names returned.
    pub fn push_record(&mut self, record: &[(&str, Value)]) -> Vec<String> {
        let dropped = record
            .iter()
            .filter(|(name, _)| self.field_index(name).is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        let row = self
            .fields
            .iter()
            .map(|field| {
                record
                    .iter()
                    .find(|(name, _)| field.eq_ignore_ascii_case(name))
                    .map_or(Value::Unknown, |(_, value)| value.clone())
            })
            .collect();
        self.rows.push(row);
        dropped
    }

    /// True when the category differs from what was read from the source.
    pub fn is_modified(&self) -> bool {
        self.origin.map_or(true, |o| o.rows != self.rows.len())
    }

    /// Field-for-field equality, ignoring layout and source position.
    pub fn same_content(&self, other: &Category) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
            && self.rows == other.rows
    }

    fn tag(&self, field: &str) -> String {
        if field.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, field)
        }
    }

    pub(crate) fn tags(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.iter().map(|f| self.tag(f))
    }
}

/// One `data_` block.
#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    categories: Vec<Category>,
    /// Byte offset just past the last token of the block
    pub(crate) end: usize,
}

impl Block {
    fn new(name: String, end: usize) -> Self {
        Self {
            name,
            categories: Vec::new(),
            end,
        }
    }

    /// Block name without the `data_` prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Looks up a category by name, e.g. `"_atom_site"` (case-insensitive).
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn category_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Adds a category that was not in the source; it is written at the end of the block.
    pub fn push_category(&mut self, category: Category) {
        self.categories.push(category);
    }

    fn add_pair(&mut self, tag: &Token, value: Value, end: usize) -> Result<(), Error> {
        let TokenKind::Tag(text) = &tag.kind else {
            unreachable!("add_pair is only called with tag tokens")
        };
        let (name, field) = split_tag(text);

        if let Some(last) = self.categories.last_mut() {
            if last.layout == Layout::Pairs && last.name.eq_ignore_ascii_case(name) {
                if last.field_index(field).is_some() {
                    return Err(Error::parse(tag.line, format!("duplicate tag {text}")));
                }
                last.fields.push(field.to_string());
                last.rows[0].push(value);
                if let Some(origin) = last.origin.as_mut() {
                    origin.end = end;
                }
                return Ok(());
            }
        }

        self.ensure_new_category(name, tag.line)?;
        self.categories.push(Category {
            name: name.to_string(),
            fields: vec![field.to_string()],
            rows: vec![vec![value]],
            layout: Layout::Pairs,
            origin: Some(Origin {
                start: tag.start,
                end,
                rows: 1,
                layout: Layout::Pairs,
            }),
        });
        Ok(())
    }

    fn ensure_new_category(&self, name: &str, line: usize) -> Result<(), Error> {
        if self.category(name).is_some() {
            return Err(Error::parse(
                line,
                format!("category {name} appears more than once in block {}", self.name),
            ));
        }
        Ok(())
    }
}

/// A parsed mmCIF file together with the text it was parsed from.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) source: String,
    blocks: Vec<Block>,
}

impl Document {
    /// Parses CIF text. A document without any `data_` block is an error.
    pub fn parse(text: impl Into<String>) -> Result<Self, Error> {
        let source = text.into();
        let blocks = Parser {
            tokens: Lexer::new(&source).peekable(),
        }
        .run()?;
        if blocks.is_empty() {
            return Err(Error::parse(1, "empty document: no data block found"));
        }
        Ok(Self { source, blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The first data block; PDB archive files hold exactly one.
    pub fn first_block(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn first_block_mut(&mut self) -> &mut Block {
        &mut self.blocks[0]
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

struct Parser<'a> {
    tokens: Peekable<Lexer<'a>>,
}

impl Parser<'_> {
    fn run(mut self) -> Result<Vec<Block>, Error> {
        let mut blocks: Vec<Block> = Vec::new();

        while let Some(token) = self.tokens.next().transpose()? {
            if let TokenKind::Data(name) = &token.kind {
                blocks.push(Block::new(name.clone(), token.end));
                continue;
            }

            let Some(block) = blocks.last_mut() else {
                return Err(Error::parse(
                    token.line,
                    "content found before the first data_ block",
                ));
            };

            match &token.kind {
                TokenKind::Tag(tag) => {
                    let Some((value, end)) = self.next_value()? else {
                        return Err(Error::parse(token.line, format!("tag {tag} has no value")));
                    };
                    block.add_pair(&token, value, end)?;
                    block.end = end;
                }
                TokenKind::Loop => {
                    let end = self.read_loop(block, &token)?;
                    block.end = end;
                }
                TokenKind::Value(value) => {
                    return Err(Error::parse(
                        token.line,
                        format!("value '{value}' does not belong to any tag"),
                    ));
                }
                TokenKind::Reserved(word) => {
                    return Err(Error::parse(
                        token.line,
                        format!("unsupported construct '{word}'"),
                    ));
                }
                TokenKind::Data(_) => unreachable!(),
            }
        }

        Ok(blocks)
    }

    fn peek_kind(&mut self) -> Option<&TokenKind> {
        match self.tokens.peek() {
            Some(Ok(token)) => Some(&token.kind),
            _ => None,
        }
    }

    /// Consumes the next token if it is a value.
    fn next_value(&mut self) -> Result<Option<(Value, usize)>, Error> {
        if !matches!(self.peek_kind(), Some(TokenKind::Value(_))) {
            // Surface a pending lexer error rather than a misleading "no value"
            if let Some(Err(_)) = self.tokens.peek() {
                self.tokens.next().transpose()?;
            }
            return Ok(None);
        }
        match self.tokens.next().transpose()? {
            Some(Token {
                kind: TokenKind::Value(value),
                end,
                ..
            }) => Ok(Some((value, end))),
            _ => Ok(None),
        }
    }

    fn read_loop(&mut self, block: &mut Block, loop_token: &Token) -> Result<usize, Error> {
        let mut tags = Vec::new();
        while let Some(TokenKind::Tag(_)) = self.peek_kind() {
            if let Some(Token {
                kind: TokenKind::Tag(tag),
                ..
            }) = self.tokens.next().transpose()?
            {
                tags.push(tag);
            }
        }
        if tags.is_empty() {
            return Err(Error::parse(loop_token.line, "loop_ without tags"));
        }

        let (name, _) = split_tag(&tags[0]);
        let name = name.to_string();
        let mut fields: Vec<String> = Vec::with_capacity(tags.len());
        for tag in &tags {
            let (category, field) = split_tag(tag);
            if !category.eq_ignore_ascii_case(&name) {
                return Err(Error::parse(
                    loop_token.line,
                    format!("loop_ mixes categories {name} and {category}"),
                ));
            }
            if fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
                return Err(Error::parse(loop_token.line, format!("duplicate tag {tag}")));
            }
            fields.push(field.to_string());
        }
        block.ensure_new_category(&name, loop_token.line)?;

        let mut values = Vec::new();
        let mut end = loop_token.end;
        while let Some((value, value_end)) = self.next_value()? {
            values.push(value);
            end = value_end;
        }
        if values.is_empty() {
            return Err(Error::parse(
                loop_token.line,
                format!("loop_ for {name} has no values"),
            ));
        }
        if values.len() % fields.len() != 0 {
            return Err(Error::parse(
                loop_token.line,
                format!(
                    "loop_ for {name} has {} values, not a multiple of its {} tags",
                    values.len(),
                    fields.len()
                ),
            ));
        }

        let rows: Vec<Vec<Value>> = values
            .chunks(fields.len())
            .map(|chunk| chunk.to_vec())
            .collect();
        block.categories.push(Category {
            name,
            fields,
            origin: Some(Origin {
                start: loop_token.start,
                end,
                rows: rows.len(),
                layout: Layout::Loop,
            }),
            rows,
            layout: Layout::Loop,
        });
        Ok(end)
    }
}

/// Splits `_category.field` into its two halves. Tags without a period
/// (DDL1 style) form a category of their own with an empty field name.
fn split_tag(tag: &str) -> (&str, &str) {
    tag.split_once('.').unwrap_or((tag, ""))
}
