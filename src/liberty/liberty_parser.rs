// SPDX-License-Identifier: Apache-2.0

//! First pass over a Liberty file: a recursive-descent parse into a tree of
//! groups and attributes.
//!
//! Groups are matched by balanced-delimiter scanning, so a `cell` or `timing`
//! group may span any number of lines and nest arbitrarily deep. No Liberty
//! semantics are applied here; see `library` for the second pass.

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Identifier(String),
    Tuple(Vec<Value>),
}

impl Value {
    /// String-ish view of a value; numbers are rendered, tuples are not.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) | Value::Identifier(s) => Some(s.clone()),
            Value::Number(n) => Some(format!("{}", n)),
            Value::Tuple(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) | Value::Identifier(s) => s.trim().parse::<f64>().ok(),
            Value::Tuple(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockAttr {
    pub attr_name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockMember {
    BlockAttr(BlockAttr),
    SubBlock(Box<Block>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: String,
    // Note: groups can be unqualified, e.g. `timing() { ... }`, or carry more
    // than one qualifier, e.g. `ff ("IQ", "IQ_N") { ... }`.
    pub qualifiers: Vec<Value>,
    pub members: Vec<BlockMember>,
}

impl Block {
    /// The first qualifier rendered as text; this is the group's name for
    /// `library`, `cell` and `pin` groups.
    pub fn name(&self) -> Option<String> {
        self.qualifiers.first().and_then(Value::as_text)
    }

    /// Last occurrence wins, matching how Liberty readers treat repeated
    /// simple attributes.
    pub fn attr(&self, attr_name: &str) -> Option<&Value> {
        self.members.iter().rev().find_map(|m| match m {
            BlockMember::BlockAttr(a) if a.attr_name == attr_name => Some(&a.value),
            _ => None,
        })
    }

    pub fn sub_blocks(&self) -> impl Iterator<Item = &Block> {
        self.members.iter().filter_map(|m| match m {
            BlockMember::SubBlock(b) => Some(b.as_ref()),
            BlockMember::BlockAttr(_) => None,
        })
    }

    pub fn sub_blocks_of_type<'a>(
        &'a self,
        block_type: &'a str,
    ) -> impl Iterator<Item = &'a Block> + 'a {
        self.sub_blocks().filter(move |b| b.block_type == block_type)
    }
}

pub struct LibertyParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

fn is_delimiter(c: u8) -> bool {
    c.is_ascii_whitespace()
        || matches!(c, b';' | b':' | b',' | b'(' | b')' | b'{' | b'}' | b'"')
}

impl<'a> LibertyParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn line_number(&self) -> usize {
        let end = self.pos.min(self.bytes.len());
        1 + self.bytes[..end].iter().filter(|c| **c == b'\n').count()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek_is_noskip(&self, expected: &str) -> bool {
        self.bytes[self.pos.min(self.bytes.len())..].starts_with(expected.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) -> Result<(), String> {
        if !self.peek_is_noskip("/*") {
            return Ok(());
        }
        let start_line = self.line_number();
        self.pos += 2;
        while !self.peek_is_noskip("*/") {
            self.pos += 1;
            if self.at_end() {
                return Err(format!("Unterminated comment starting at line {}", start_line));
            }
        }
        self.pos += 2;
        Ok(())
    }

    fn skip_line_continuation(&mut self) {
        if self.peek_is_noskip("\\") {
            self.pos += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), String> {
        loop {
            let start_pos = self.pos;
            self.skip_whitespace();
            self.skip_comment()?;
            self.skip_line_continuation();
            if self.pos == start_pos {
                return Ok(());
            }
        }
    }

    fn peek_is(&mut self, expected: &str) -> Result<bool, String> {
        self.skip_whitespace_and_comments()?;
        Ok(self.peek_is_noskip(expected))
    }

    fn try_pop(&mut self, expected: &str) -> Result<bool, String> {
        if self.peek_is(expected)? {
            self.pos += expected.len();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn peek_line(&self) -> String {
        let start = self.pos.min(self.bytes.len());
        let end = self.bytes[start..]
            .iter()
            .position(|c| *c == b'\n')
            .map(|i| start + i)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[start..end]).to_string()
    }

    fn pop_or_error(&mut self, expected: &str, context: &str) -> Result<(), String> {
        if self.try_pop(expected)? {
            Ok(())
        } else {
            Err(format!(
                "Expected: {:?} at {} (line {}), rest: {:?}",
                expected,
                context,
                self.line_number(),
                self.peek_line()
            ))
        }
    }

    /// Pops a bare token: everything up to the next delimiter.
    fn pop_word(&mut self, context: &str) -> Result<String, String> {
        self.skip_whitespace_and_comments()?;
        let start = self.pos;
        while self.pos < self.bytes.len() && !is_delimiter(self.bytes[self.pos]) {
            // A backslash-newline continuation ends the token.
            if self.bytes[self.pos] == b'\\' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!(
                "Expected token in {} (line {}); rest: {:?}",
                context,
                self.line_number(),
                self.peek_line()
            ));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string())
    }

    fn pop_string(&mut self) -> Result<String, String> {
        self.pop_or_error("\"", "string value start")?;
        let start_line = self.line_number();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'"' {
            self.pos += 1;
        }
        if self.at_end() {
            return Err(format!("Unterminated string starting at line {}", start_line));
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();
        self.pos += 1;
        Ok(text)
    }

    fn pop_value(&mut self, context: &str) -> Result<Value, String> {
        if self.peek_is("\"")? {
            return Ok(Value::String(self.pop_string()?));
        }
        let word = self.pop_word(context)?;
        match word.parse::<f64>() {
            Ok(n) => Ok(Value::Number(n)),
            Err(_) => Ok(Value::Identifier(word)),
        }
    }

    /// Parses the parenthesized list after a group or complex attribute name;
    /// the opening paren has already been consumed.
    fn pop_value_list(&mut self) -> Result<Vec<Value>, String> {
        let mut values = Vec::new();
        if self.try_pop(")")? {
            return Ok(values);
        }
        values.push(self.pop_value("parenthesized value")?);
        while !self.try_pop(")")? {
            self.pop_or_error(",", "value list separator")?;
            values.push(self.pop_value("parenthesized value")?);
        }
        Ok(values)
    }

    fn parse_block_member(&mut self) -> Result<BlockMember, String> {
        let attr_name = self.pop_word("attribute name")?;
        if self.try_pop(":")? {
            let value = self.pop_value("attribute value")?;
            self.try_pop(";")?;
            return Ok(BlockMember::BlockAttr(BlockAttr { attr_name, value }));
        }

        self.pop_or_error("(", "group or complex attribute start")?;
        let mut values = self.pop_value_list()?;
        if self.peek_is("{")? {
            let block = self.parse_block_with_type_and_qualifiers(attr_name, values)?;
            return Ok(BlockMember::SubBlock(Box::new(block)));
        }
        self.try_pop(";")?;
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Tuple(values)
        };
        Ok(BlockMember::BlockAttr(BlockAttr { attr_name, value }))
    }

    fn parse_block_with_type_and_qualifiers(
        &mut self,
        block_type: String,
        qualifiers: Vec<Value>,
    ) -> Result<Block, String> {
        let start_line = self.line_number();
        self.pop_or_error("{", "group body start")?;
        let mut members = Vec::new();
        while !self.peek_is("}")? {
            if self.at_end() {
                return Err(format!(
                    "Unterminated group {:?} starting at line {}",
                    block_type, start_line
                ));
            }
            members.push(self.parse_block_member()?);
        }
        self.pop_or_error("}", "group body end")?;
        Ok(Block {
            block_type,
            qualifiers,
            members,
        })
    }

    /// Parses the top-level group (normally `library (...) { ... }`).
    pub fn parse(&mut self) -> Result<Block, String> {
        match self.parse_block_member()? {
            BlockMember::SubBlock(block) => Ok(*block),
            BlockMember::BlockAttr(attr) => Err(format!(
                "Expected a top-level group, got attribute {:?}",
                attr.attr_name
            )),
        }
    }
}
