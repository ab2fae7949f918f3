//! Turns a feed item into the card text and the SSML announcement.
//!
//! Pipeline:
//! 1. Publication date → spoken date (`say-as`) and card date
//! 2. Description → ordered regex rewrites (normalize, strip quote, strip
//!    links, escape brackets, pronunciation fixes, strip ad)
//! 3. Collapse repeated spaces until none are left
//! 4. Compose `<speak>` markup and the two-line card
//!
//! Rule order matters: the quote marker contains a `<p>`, so it must run
//! before paragraph tags are blanked, and bracket escaping must run after
//! links are gone.

use std::sync::LazyLock;

use regex::Regex;

use crate::feed::FeedItem;

const PAUSE: &str = r#"<break strength="x-strong"/>"#;
const CARD_HEADING: &str = "Die Wettermail";
const SPEECH_HEADING: &str = "Wetter Mail";

const VOICE_DATE_FORMAT: &str = r#"<say-as interpret-as="date" format="dm">%-d.%-m.</say-as> %H:%M"#;
const CARD_DATE_FORMAT: &str = "%d.%m. %H:%M";

const GFS_SPOKEN: &str =
    r#"<say-as interpret-as="spell-out">GFS</say-as><break time="10ms" />Modell"#;

/// (pattern, replacement), applied top to bottom.
const RULES: &[(&str, &str)] = &[
    (r"\n", " "),
    (r"\r", " "),
    (r"(?i)&nbsp;", " "),
    // Quoted previous mail starts here; drop it and everything after.
    (r"(?i)<p> Stefan Ochs Wettermail - .*", ""),
    (r"(?i)</?p>", " "),
    (r"(?i)<br\s*/?>", " "),
    (r"(?i)<a[^<]*</a>", " "),
    (r"<", " kleiner "),
    (r">", " größer "),
    (r"(?i)d\.h\.", "das heisst"),
    (r"(?i)gfs-modell", GFS_SPOKEN),
    (r"(?i)wetterochs", "wetter-ochs"),
    (r"(\d)-(\d)", "${1} bis ${2}"),
    // Advertisement block at the end of the mail.
    (r"(?i)\* werbung .*", " "),
];

static COMPILED_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|(pattern, replacement)| {
            let re = Regex::new(pattern).expect("built-in rewrite rule must compile");
            (re, *replacement)
        })
        .collect()
});

/// The two outputs derived from one feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub display_text: String,
    pub voice_markup: String,
}

/// Render a feed item. Pure; the same item always yields the same output.
pub fn render(item: &FeedItem) -> Rendered {
    let voice_date = item.published_at.format(VOICE_DATE_FORMAT);
    let card_date = item.published_at.format(CARD_DATE_FORMAT);
    let description = clean_description(&item.raw_description);

    let voice_markup = format!(
        "<speak>{PAUSE}{SPEECH_HEADING} vom {voice_date}{PAUSE} {}{PAUSE}{description}</speak>",
        item.title
    );
    let display_text = format!(
        "{CARD_HEADING} vom {card_date}\n{} - {description}",
        item.title
    );

    Rendered {
        display_text,
        voice_markup,
    }
}

/// Apply the rewrite rules and normalize whitespace.
pub fn clean_description(raw: &str) -> String {
    let mut desc = raw.to_string();
    for (re, replacement) in COMPILED_RULES.iter() {
        desc = re.replace_all(&desc, *replacement).into_owned();
    }
    collapse_spaces(&desc)
}

/// Rewrites can leave fresh double spaces behind, so repeat until stable.
fn collapse_spaces(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out.trim().to_string()
}
