use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    List { ordered: bool },
    Table,
    Quote,
    Code,
    Rule,
    Container,
}

impl BlockKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "h1" => BlockKind::Heading(1),
            "h2" => BlockKind::Heading(2),
            "h3" => BlockKind::Heading(3),
            "h4" => BlockKind::Heading(4),
            "h5" => BlockKind::Heading(5),
            "h6" => BlockKind::Heading(6),
            "p" => BlockKind::Paragraph,
            "ul" => BlockKind::List { ordered: false },
            "ol" => BlockKind::List { ordered: true },
            "table" => BlockKind::Table,
            "blockquote" => BlockKind::Quote,
            "pre" => BlockKind::Code,
            "hr" => BlockKind::Rule,
            "div" => BlockKind::Container,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BlockKind::Heading(1) => "h1",
            BlockKind::Heading(2) => "h2",
            BlockKind::Heading(3) => "h3",
            BlockKind::Heading(4) => "h4",
            BlockKind::Heading(5) => "h5",
            BlockKind::Heading(_) => "h6",
            BlockKind::Paragraph => "p",
            BlockKind::List { ordered: false } => "ul",
            BlockKind::List { ordered: true } => "ol",
            BlockKind::Table => "table",
            BlockKind::Quote => "blockquote",
            BlockKind::Code => "pre",
            BlockKind::Rule => "hr",
            BlockKind::Container => "div",
        }
    }
}

/// One page-able block, serialized back to markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    /// Position in document order among extracted blocks.
    pub index: usize,
    pub kind: BlockKind,
    pub markup: String,
}

const SKIPPED: &[&str] = &["head", "style", "script", "template", "noscript"];

pub fn extract_blocks(markup: &str) -> Vec<ContentNode> {
    let document = kuchiki::parse_html().one(markup);
    let mut blocks = Vec::new();
    let root = match document.select_first("body") {
        Ok(body) => body.as_node().clone(),
        Err(()) => document,
    };
    collect_blocks(&root, &mut blocks);
    blocks
}

fn collect_blocks(parent: &NodeRef, out: &mut Vec<ContentNode>) {
    for child in parent.children() {
        let Some(tag) = element_tag(&child) else {
            continue;
        };
        if SKIPPED.contains(&tag.as_str()) {
            continue;
        }
        match BlockKind::from_tag(&tag) {
            Some(BlockKind::Container) if contains_block(&child) && !has_inline_content(&child) => {
                collect_blocks(&child, out)
            }
            Some(kind) => out.push(ContentNode {
                index: out.len(),
                kind,
                markup: child.to_string(),
            }),
            // Inline elements and wrappers such as <section> may still hold blocks.
            None => collect_blocks(&child, out),
        }
    }
}

fn contains_block(node: &NodeRef) -> bool {
    node.descendants().any(|descendant| {
        element_tag(&descendant)
            .map(|tag| BlockKind::from_tag(&tag).is_some())
            .unwrap_or(false)
    })
}

/// Non-blank text or inline elements sitting directly in `node` next to its
/// blocks. Such a container is kept whole so its own text is paginated.
fn has_inline_content(node: &NodeRef) -> bool {
    node.children().any(|child| match element_tag(&child) {
        None => child
            .as_text()
            .map(|text| !text.borrow().trim().is_empty())
            .unwrap_or(false),
        Some(tag) => {
            !SKIPPED.contains(&tag.as_str())
                && BlockKind::from_tag(&tag).is_none()
                && !contains_block(&child)
                && (tag == "img" || !child.text_contents().trim().is_empty())
        }
    })
}

pub(crate) fn element_tag(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}
