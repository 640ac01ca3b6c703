use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const STRIKE: &str = "\x1b[9m";
const CODE: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Render assistant markdown as terminal text. Single newlines are kept as
/// line breaks. With `ansi` off only plain text is produced.
pub fn render_markdown(input: &str, ansi: bool) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(input, options);

    let mut renderer = Renderer::new(ansi);
    for event in parser {
        renderer.handle_event(event);
    }
    renderer.finish()
}

struct Renderer {
    out: String,
    ansi: bool,
    at_line_start: bool,
    bold: bool,
    italic: bool,
    strikethrough: bool,
    link_url: Option<String>,
    link_text: String,
    in_code_block: bool,
    quote_depth: usize,
    // `Some(n)` for ordered lists holds the next item number.
    list_stack: Vec<Option<u64>>,
}

impl Renderer {
    fn new(ansi: bool) -> Self {
        Self {
            out: String::new(),
            ansi,
            at_line_start: true,
            bold: false,
            italic: false,
            strikethrough: false,
            link_url: None,
            link_text: String::new(),
            in_code_block: false,
            quote_depth: 0,
            list_stack: Vec::new(),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.handle_start(tag),
            Event::End(tag) => self.handle_end(tag),
            Event::Text(text) => self.handle_text(&text),
            Event::Code(code) => self.handle_inline_code(&code),
            Event::SoftBreak | Event::HardBreak => self.newline(),
            Event::Rule => {
                self.blank_line();
                self.push_styled(DIM, "────────");
                self.newline();
                self.blank_line();
            }
            _ => {}
        }
    }

    fn handle_start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank_line();
                let marker = "#".repeat(level as usize);
                self.push_styled(BOLD, &format!("{} ", marker));
                self.bold = true;
            }
            Tag::Strong => self.bold = true,
            Tag::Emphasis => self.italic = true,
            Tag::Strikethrough => self.strikethrough = true,
            Tag::Link { dest_url, .. } => {
                self.link_url = Some(dest_url.to_string());
                self.link_text.clear();
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                if let CodeBlockKind::Fenced(lang) = kind {
                    let lang = lang.trim();
                    if !lang.is_empty() {
                        self.push_styled(DIM, &format!("[{}]", lang));
                        self.newline();
                    }
                }
                self.in_code_block = true;
            }
            Tag::BlockQuote(_) => {
                self.blank_line();
                self.quote_depth += 1;
            }
            Tag::List(start) => {
                if self.list_stack.is_empty() {
                    self.blank_line();
                } else {
                    self.ensure_line();
                }
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.ensure_line();
                let depth = self.list_stack.len().saturating_sub(1);
                let marker = match self.list_stack.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                self.push_raw(&format!("{}{}", "  ".repeat(depth), marker));
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.list_stack.is_empty() {
                    self.blank_line();
                } else {
                    self.ensure_line();
                }
            }
            TagEnd::Heading(_) => {
                self.bold = false;
                self.blank_line();
            }
            TagEnd::Strong => self.bold = false,
            TagEnd::Emphasis => self.italic = false,
            TagEnd::Strikethrough => self.strikethrough = false,
            TagEnd::Link => {
                if let Some(url) = self.link_url.take() {
                    if url != self.link_text {
                        self.push_styled(DIM, &format!(" ({})", url));
                    }
                }
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.ensure_line(),
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &CowStr) {
        if self.in_code_block {
            for line in text.split_inclusive('\n') {
                let (body, ends_line) = match line.strip_suffix('\n') {
                    Some(body) => (body, true),
                    None => (line, false),
                };
                if self.at_line_start {
                    self.push_raw("    ");
                }
                self.push_styled(CODE, body);
                if ends_line {
                    self.newline();
                }
            }
            return;
        }

        if self.link_url.is_some() {
            self.link_text.push_str(text);
        }

        let mut style = String::new();
        if self.bold {
            style.push_str(BOLD);
        }
        if self.italic {
            style.push_str(ITALIC);
        }
        if self.strikethrough {
            style.push_str(STRIKE);
        }
        self.push_styled(&style, text);
    }

    fn handle_inline_code(&mut self, code: &CowStr) {
        if self.ansi {
            self.push_styled(CODE, code);
        } else {
            self.push_raw(&format!("`{}`", code));
        }
    }

    fn push_styled(&mut self, style: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.ansi && !style.is_empty() {
            self.push_raw(&format!("{}{}{}", style, text, RESET));
        } else {
            self.push_raw(text);
        }
    }

    fn push_raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.at_line_start && self.quote_depth > 0 {
            let prefix = "> ".repeat(self.quote_depth);
            self.out.push_str(&prefix);
        }
        self.out.push_str(text);
        self.at_line_start = false;
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    fn ensure_line(&mut self) {
        if !self.at_line_start {
            self.newline();
        }
    }

    fn blank_line(&mut self) {
        if self.out.is_empty() {
            return;
        }
        self.ensure_line();
        if !self.out.ends_with("\n\n") {
            self.newline();
        }
    }

    fn finish(self) -> String {
        self.out.trim_end_matches('\n').to_string()
    }
}
