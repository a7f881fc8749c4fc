// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Report rendering.
///
/// The markup report is the single source of truth: the plain-text and HTML
/// variants are derived from it mechanically, so every channel shows the same
/// content. Rendering performs no I/O and depends only on the [`Report`].
use std::{borrow::Cow, fmt::Write as _, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{
    config::CheckFrequency,
    digest::RepositoryDigest,
    event::{
        CommitEvent, EventKind, IssueEvent, ItemState, NormalizedEvent, PullRequestEvent,
        ReleaseEvent,
    },
};

const HEADER_GLYPH: char = '📊';
const REPOSITORY_GLYPH: char = '🔹';
const EMPTY_GLYPH: char = '📭';
const MERGED_GLYPH: char = '✅';
const CLOSED_GLYPH: char = '🔴';
const OPEN_GLYPH: char = '🟡';
const STABLE_GLYPH: char = '📦';
const DRAFT_GLYPH: char = '🔧';
const PRERELEASE_GLYPH: char = '⚠';
const VARIATION_SELECTOR: char = '\u{FE0F}';

/// Decorative glyphs removed from the plain-text report.
pub const GLYPHS: [char; 13] = [
    HEADER_GLYPH,
    REPOSITORY_GLYPH,
    EMPTY_GLYPH,
    '📝',
    '🔀',
    '❗',
    '🚀',
    MERGED_GLYPH,
    CLOSED_GLYPH,
    OPEN_GLYPH,
    STABLE_GLYPH,
    DRAFT_GLYPH,
    PRERELEASE_GLYPH,
];

/// Notice rendered when no repository had activity.
pub const NO_UPDATES_NOTICE: &str = "No updates detected for any subscribed repository.";

const TITLE: &str = "Repository Activity Report";
const RULE: &str = "=============================";
const REPOSITORY_LEAD: &str = "🔹 Repository: ";
const ENTRY_LEAD: &str = "- ";
const SECTION_RULE: &str = "---";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const DATE_FORMAT: &str = "%Y-%m-%d";

static LINK: LazyLock<Regex,> = LazyLock::new(|| {
    Regex::new(r"\[(.*?)\]\((.*?)\)",).unwrap_or_else(|error| panic!("invalid link pattern: {error}"),)
},);

/// Input of one rendering pass.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct Report
{
    pub generated_at: DateTime<Utc,>,
    pub frequency:    CheckFrequency,
    /// Non-empty digests in subscription order.
    pub digests:      Vec<RepositoryDigest,>,
}

impl Report
{
    pub fn new(
        generated_at: DateTime<Utc,>,
        frequency: CheckFrequency,
        digests: Vec<RepositoryDigest,>,
    ) -> Self
    {
        Self {
            generated_at,
            frequency,
            digests,
        }
    }

    /// `true` when no repository has activity.
    pub fn is_empty(&self,) -> bool
    {
        self.digests.is_empty()
    }

    /// Subject line used by the email channel.
    pub fn email_subject(&self,) -> String
    {
        format!("Repository activity report ({})", self.generated_at.format(DATE_FORMAT))
    }
}

/// Markup and plain-text renditions of one [`Report`].
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct RenderedReport
{
    pub markup:     String,
    pub plain_text: String,
    link_base:      String,
}

impl RenderedReport
{
    /// Minimal HTML rendition used as email body.
    pub fn html(&self,) -> String
    {
        to_html(&self.markup, &self.link_base,)
    }
}

/// Renders reports with repository links pointing at `web_base_url`.
#[derive(Debug, Clone,)]
pub struct ReportRenderer
{
    web_base_url: String,
}

impl ReportRenderer
{
    pub fn new(web_base_url: impl Into<String,>,) -> Self
    {
        Self {
            web_base_url: web_base_url.into().trim_end_matches('/',).to_owned(),
        }
    }

    /// Renders markup and derives the plain-text variant from it.
    pub fn render(&self, report: &Report,) -> RenderedReport
    {
        let markup = self.markup(report,);
        let plain_text = to_plain_text(&markup,);
        RenderedReport {
            markup,
            plain_text,
            link_base: self.web_base_url.clone(),
        }
    }

    /// Renders the markup report.
    pub fn markup(&self, report: &Report,) -> String
    {
        let mut out = String::new();
        write_header(&mut out, report,);

        if report.is_empty() {
            let _ = writeln!(out, "{EMPTY_GLYPH} {NO_UPDATES_NOTICE}");
            return out;
        }

        for digest in &report.digests {
            self.write_repository(&mut out, digest,);
        }
        out
    }

    fn repository_url(&self, digest: &RepositoryDigest,) -> String
    {
        format!("{}/{}/{}", self.web_base_url, digest.owner, digest.repo)
    }

    fn write_repository(&self, out: &mut String, digest: &RepositoryDigest,)
    {
        let _ = writeln!(
            out,
            "{REPOSITORY_LEAD}[{}]({})",
            digest.full_name(),
            self.repository_url(digest)
        );
        let _ = writeln!(out, "Updated at: {}", digest.fetched_at.format(TIMESTAMP_FORMAT));
        out.push('\n',);

        for kind in EventKind::ALL {
            let events = digest.events_of(kind,);
            if events.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {} {} ({}):", kind_glyph(kind), kind.label(), events.len());
            for event in events {
                write_event(out, event,);
            }
            out.push('\n',);
        }

        let _ = writeln!(out, "{SECTION_RULE}");
        out.push('\n',);
    }
}

fn write_header(out: &mut String, report: &Report,)
{
    let _ = writeln!(out, "{HEADER_GLYPH} {TITLE}");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Generated at: {}", report.generated_at.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "Monitoring period: {}", report.frequency.period_label());
    let _ = writeln!(out, "{RULE}");
    out.push('\n',);
}

const fn kind_glyph(kind: EventKind,) -> char
{
    match kind {
        EventKind::Commit => '📝',
        EventKind::PullRequest => '🔀',
        EventKind::Issue => '❗',
        EventKind::Release => '🚀',
    }
}

fn write_event(out: &mut String, event: &NormalizedEvent,)
{
    match event {
        NormalizedEvent::Commit(commit,) => write_commit(out, commit,),
        NormalizedEvent::PullRequest(pull,) => write_pull_request(out, pull,),
        NormalizedEvent::Issue(issue,) => write_issue(out, issue,),
        NormalizedEvent::Release(release,) => write_release(out, release,),
    }
}

fn write_commit(out: &mut String, commit: &CommitEvent,)
{
    let _ = writeln!(out, "    - [{}]({}) {}", commit.sha, commit.url, single_line(&commit.message));
    let _ = writeln!(out, "      Author: {} | Date: {}", commit.author, date(commit.created_at));
}

fn write_pull_request(out: &mut String, pull: &PullRequestEvent,)
{
    let status = if pull.merged {
        format!("{MERGED_GLYPH} merged")
    } else {
        state_label(pull.state,)
    };
    let _ =
        writeln!(out, "    - [#{}]({}) {} {status}", pull.number, pull.url, single_line(&pull.title));
    let _ = writeln!(out, "      Author: {} | Created: {}", pull.author, date(pull.created_at));
}

fn write_issue(out: &mut String, issue: &IssueEvent,)
{
    let _ = writeln!(
        out,
        "    - [#{}]({}) {} {}",
        issue.number,
        issue.url,
        single_line(&issue.title),
        state_label(issue.state)
    );
    let closed = issue.closed_at.map(|at| format!(" | Closed: {}", at.format(DATE_FORMAT)),);
    let _ = writeln!(
        out,
        "      Author: {} | Created: {}{}",
        issue.author,
        date(issue.created_at),
        closed.unwrap_or_default()
    );
}

fn write_release(out: &mut String, release: &ReleaseEvent,)
{
    let status = if release.draft {
        format!("{DRAFT_GLYPH} draft")
    } else if release.prerelease {
        format!("{PRERELEASE_GLYPH}{VARIATION_SELECTOR} pre-release")
    } else {
        format!("{STABLE_GLYPH} stable")
    };
    let _ = writeln!(
        out,
        "    - [{}]({}): {} {status}",
        release.tag_name,
        release.url,
        single_line(&release.name)
    );
    let _ = writeln!(
        out,
        "      Author: {} | Published: {}",
        release.author,
        date(release.published_at.or(release.created_at))
    );
    let body = single_line(&release.body,);
    if !body.is_empty() {
        let _ = writeln!(out, "      Notes: {body}");
    }
}

fn state_label(state: ItemState,) -> String
{
    match state {
        ItemState::Open => format!("{OPEN_GLYPH} open"),
        ItemState::Closed => format!("{CLOSED_GLYPH} closed"),
    }
}

fn date(instant: Option<DateTime<Utc,>,>,) -> String
{
    instant.map_or_else(|| "n/a".to_owned(), |at| at.format(DATE_FORMAT,).to_string(),)
}

/// Collapses runs of whitespace, including newlines, into single spaces.
fn single_line(text: &str,) -> String
{
    text.split_whitespace().collect::<Vec<_,>>().join(" ",)
}

/// Derives the plain-text report from markup.
///
/// Glyphs are removed first (the repository bullet becomes `-`), then
/// `[label](url)` is rewritten to `label (url)` until no link syntax remains.
pub fn to_plain_text(markup: &str,) -> String
{
    let mut text = strip_glyphs(markup,);
    loop {
        match LINK.replace_all(&text, "$1 ($2)",) {
            Cow::Borrowed(_,) => return text,
            Cow::Owned(rewritten,) => text = rewritten,
        }
    }
}

fn strip_glyphs(markup: &str,) -> String
{
    let mut out = String::with_capacity(markup.len(),);
    let mut chars = markup.chars().peekable();

    while let Some(ch,) = chars.next() {
        if ch == REPOSITORY_GLYPH {
            out.push('-',);
            chars.next_if_eq(&VARIATION_SELECTOR,);
        } else if GLYPHS.contains(&ch,) {
            chars.next_if_eq(&VARIATION_SELECTOR,);
            chars.next_if_eq(&' ',);
        } else {
            out.push(ch,);
        }
    }
    out
}

/// Converts markup into a minimal HTML document.
///
/// Text is escaped, repository headings are bold and indentation plus line
/// breaks are preserved. Only the link opening a repository heading or an
/// entry becomes an anchor, and only when it points below `link_base`. Link
/// syntax anywhere else, such as inside an issue title, stays plain text.
pub fn to_html(markup: &str, link_base: &str,) -> String
{
    let link_prefix = format!("{}/", link_base.trim_end_matches('/',));
    let mut body = String::new();
    for line in markup.lines() {
        let trimmed = line.trim_start_matches(' ',);
        let indent = line.len() - trimmed.len();
        let content = html_line(trimmed, &link_prefix,);
        body.push_str(&"&nbsp;".repeat(indent,),);
        if line.starts_with(REPOSITORY_GLYPH,) {
            let _ = write!(body, "<b>{content}</b>");
        } else {
            body.push_str(&content,);
        }
        body.push_str("<br>\n",);
    }

    format!(
        "<html>\n<body style=\"font-family: monospace;\">\n{body}</body>\n</html>\n"
    )
}

/// Escapes one markup line, turning its leading link into an anchor.
fn html_line(line: &str, link_prefix: &str,) -> String
{
    let Some(link,) = LINK.captures(line,) else {
        return escape_html(line,);
    };
    let (Some(whole,), Some(label,), Some(href,),) = (link.get(0,), link.get(1,), link.get(2,),)
    else {
        return escape_html(line,);
    };

    let lead = &line[..whole.start()];
    let owned_position = lead == ENTRY_LEAD || lead == REPOSITORY_LEAD;
    if !owned_position || !href.as_str().starts_with(link_prefix,) {
        return escape_html(line,);
    }

    format!(
        "{}<a href=\"{}\">{}</a>{}",
        escape_html(lead,),
        escape_html(href.as_str(),),
        escape_html(label.as_str(),),
        escape_html(&line[whole.end()..],)
    )
}

fn escape_html(text: &str,) -> String
{
    let mut out = String::with_capacity(text.len(),);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;",),
            '<' => out.push_str("&lt;",),
            '>' => out.push_str("&gt;",),
            '"' => out.push_str("&quot;",),
            '\'' => out.push_str("&#39;",),
            other => out.push(other,),
        }
    }
    out
}
