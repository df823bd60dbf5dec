use std::path::Path;

/// Values substituted into command arguments.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    pub document: String,
    /// Empty when the post has no cover image.
    pub asset: String,
    pub html_dir: String,
    pub title: String,
    pub author: String,
    pub date: String,
}

impl Placeholders {
    pub fn path(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        Some(match name {
            "document" => &self.document,
            "asset" => &self.asset,
            "html_dir" => &self.html_dir,
            "title" => &self.title,
            "author" => &self.author,
            "date" => &self.date,
            _ => return None,
        })
    }
}

/// A program plus arguments with `{name}` placeholders.
///
/// Arguments are passed straight to the program, never through a shell, so
/// substituted values need no quoting. Unknown `{...}` sequences are left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    /// `None` when there is no program to run.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Some(Self { argv }),
            _ => None,
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn render(&self, values: &Placeholders) -> Vec<String> {
        self.argv.iter().map(|arg| substitute(arg, values)).collect()
    }
}

fn substitute(arg: &str, values: &Placeholders) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match values.lookup(&after[..close]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
