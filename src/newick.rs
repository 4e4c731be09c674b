//! Newick reader and annotated Newick writer.
//!
//! Supports the standard grammar:
//! ```text
//! tree     = subtree ';'
//! subtree  = '(' subtree ',' subtree ')' label | label
//! label    = name? (':' length)? ('[' comment ']')?
//! ```
//! Only bifurcating trees are accepted. Bracketed comments are skipped, and
//! parsing uses an explicit stack so deeply nested input cannot overflow.

use crate::error::{DlrsError, Result};
use crate::tree::{RBTree, VertexId};

/// A parsed tree together with its optional branch lengths.
#[derive(Debug, Clone)]
pub struct NewickTree {
    pub tree: RBTree,
    pub lengths: Vec<Option<f64>>,
}

/// Parse a single Newick string.
pub fn parse(input: &str) -> Result<NewickTree> {
    let mut parser = Parser::new(input.as_bytes());
    parser.parse_tree()?;
    parser.finish()
}

/// Parse one tree per line, skipping blank lines and `#` comments.
pub fn parse_many(text: &str) -> Result<Vec<NewickTree>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse)
        .collect()
}

struct RawNode {
    parent: Option<VertexId>,
    name: Option<String>,
    length: Option<f64>,
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<RawNode>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn alloc(&mut self, parent: Option<VertexId>) -> VertexId {
        self.nodes.push(RawNode {
            parent,
            name: None,
            length: None,
        });
        self.nodes.len() - 1
    }

    fn parse_tree(&mut self) -> Result<()> {
        // Open clades, innermost last.
        let mut open: Vec<VertexId> = Vec::new();
        // Vertex whose label is currently being read, if any.
        let mut current: Option<VertexId> = None;
        // Set after '(' and ',' until a child appears.
        let mut expect_child = true;

        loop {
            self.skip_whitespace();
            let byte = self
                .peek()
                .ok_or_else(|| DlrsError::Parse("expected ';' at end of Newick string".into()))?;
            match byte {
                b'(' => {
                    if !expect_child {
                        return Err(self.error("unexpected '('"));
                    }
                    self.pos += 1;
                    let id = self.alloc(open.last().copied());
                    open.push(id);
                    current = None;
                }
                b',' | b')' => {
                    if open.is_empty() {
                        return Err(self.error("unbalanced parentheses"));
                    }
                    if expect_child {
                        // Empty leaf such as in "(,)".
                        self.alloc(open.last().copied());
                    }
                    self.pos += 1;
                    if byte == b',' {
                        expect_child = true;
                        current = None;
                        continue;
                    }
                    current = open.pop();
                    expect_child = false;
                    continue;
                }
                b';' => {
                    if !open.is_empty() {
                        return Err(self.error("unbalanced parentheses"));
                    }
                    if self.nodes.is_empty() {
                        return Err(self.error("empty tree"));
                    }
                    self.pos += 1;
                    return Ok(());
                }
                b':' => {
                    let id = self.current_or_new_leaf(&mut current, &open, &mut expect_child);
                    self.pos += 1;
                    self.skip_whitespace();
                    let length = self.parse_float()?;
                    self.nodes[id].length = Some(length);
                    continue;
                }
                b'[' => {
                    self.skip_comment()?;
                    continue;
                }
                _ => {
                    let id = self.current_or_new_leaf(&mut current, &open, &mut expect_child);
                    let name = self.parse_name()?;
                    if name.is_empty() {
                        return Err(self.error("unexpected character"));
                    }
                    self.nodes[id].name = Some(name);
                    continue;
                }
            }
            expect_child = true;
        }
    }

    fn current_or_new_leaf(
        &mut self,
        current: &mut Option<VertexId>,
        open: &[VertexId],
        expect_child: &mut bool,
    ) -> VertexId {
        match *current {
            Some(id) => id,
            None => {
                let id = self.alloc(open.last().copied());
                *current = Some(id);
                *expect_child = false;
                id
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'\'' {
                    let name = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                    self.pos += 1;
                    return Ok(name);
                }
                self.pos += 1;
            }
            return Err(DlrsError::Parse("unterminated quoted label".into()));
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b':' | b',' | b')' | b'(' | b';' | b'[') || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_float(&mut self) -> Result<f64> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        if text.is_empty() {
            return Err(self.error("expected number after ':'"));
        }
        text.parse()
            .map_err(|_| DlrsError::Parse(format!("invalid branch length: '{}'", text)))
    }

    fn skip_comment(&mut self) -> Result<()> {
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b']' {
                return Ok(());
            }
        }
        Err(DlrsError::Parse("unterminated '[' comment".into()))
    }

    fn error(&self, what: &str) -> DlrsError {
        DlrsError::Parse(format!("{} at byte {}", what, self.pos))
    }

    fn finish(self) -> Result<NewickTree> {
        let parents = self.nodes.iter().map(|n| n.parent).collect();
        let lengths = self.nodes.iter().map(|n| n.length).collect();
        let names = self.nodes.into_iter().map(|n| n.name).collect();
        let tree = RBTree::from_parents(parents, names)?;
        Ok(NewickTree { tree, lengths })
    }
}

/// Serialises `tree` with per-vertex labels, lengths and bracketed meta
/// comments, e.g. `(a:0.5[&&PRIME VERTEXTYPE=Leaf],b:0.5[...]):0.2[...];`.
pub fn write_annotated<N, L, M>(tree: &RBTree, name: N, length: L, meta: M) -> String
where
    N: Fn(VertexId) -> Option<String>,
    L: Fn(VertexId) -> Option<f64>,
    M: Fn(VertexId) -> Option<String>,
{
    enum Step {
        Open(VertexId),
        Comma,
        Close(VertexId),
    }

    let label = |v: VertexId, buf: &mut String| {
        if let Some(n) = name(v) {
            buf.push_str(&n);
        }
        if let Some(len) = length(v) {
            buf.push(':');
            buf.push_str(&len.to_string());
        }
        if let Some(m) = meta(v) {
            buf.push_str(&m);
        }
    };

    let mut buf = String::new();
    let mut stack = vec![Step::Open(tree.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(v) => match tree.children(v) {
                Some((l, r)) => {
                    buf.push('(');
                    stack.push(Step::Close(v));
                    stack.push(Step::Open(r));
                    stack.push(Step::Comma);
                    stack.push(Step::Open(l));
                }
                None => label(v, &mut buf),
            },
            Step::Comma => buf.push(','),
            Step::Close(v) => {
                buf.push(')');
                label(v, &mut buf);
            }
        }
    }
    buf.push(';');
    buf
}

/// Plain Newick with names and branch lengths.
pub fn write(tree: &NewickTree) -> String {
    write_annotated(
        &tree.tree,
        |v| tree.tree.name(v).map(str::to_string),
        |v| tree.lengths[v],
        |_| None,
    )
}
