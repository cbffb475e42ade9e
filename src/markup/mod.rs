//! Live markup embedded in markdown documents.
//!
//! | Form                                         | Kind             |
//! |----------------------------------------------|------------------|
//! | `` [`VALUE`](codebook:KEY) ``                | `TemplateInline` |
//! | `[TEXT](URL "codebook:KEY")`                 | `TemplateUrl`    |
//! | `[TEXT](path/to/file.md)`                    | `MarkdownLink`   |
//! | `[TEXT](URL "codebook:backlink")`            | `Backlink`       |
//! | `<span data-codebook="KEY">VALUE</span>`     | `Span`           |
//! | `<div data-codebook="KEY">CONTENT</div>`     | `Div`            |
//! | `<exec lang="L">CODE</exec><output>…</output>` | `Exec`         |
//! | `<cicada endpoint="E" …>CONTENT</cicada>`    | `Query`          |

pub mod frontmatter;
pub mod guard;
pub mod reference;
pub mod scanner;
pub mod substitute;

pub use frontmatter::Frontmatter;
pub use reference::{Kind, Markup, Reference};
pub use scanner::{find_templates, scan, template_keys};
pub use substitute::{Values, replace_values};
