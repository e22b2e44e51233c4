use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while reading an RSS document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML itself is invalid
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    /// The body contained no element at all
    #[error("Document is empty")]
    Empty,
    /// The body ended while elements were still open
    #[error("Unexpected end of document inside <{0}>")]
    Truncated(String),
}

/// An RSS 2.0 channel as read from the wire.
///
/// Text fields hold the literal characters after XML and HTML entity
/// unescaping; `pub_date` on items is left exactly as the feed wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Element whose character data we keep.
#[derive(Clone, Copy)]
enum Slot {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// Resolve the open-element path to a slot.
///
/// The root element's name is not checked. Prefixed names such as
/// `atom:link` never match, so they cannot clobber the plain RSS fields.
fn slot_for(path: &[String]) -> Option<Slot> {
    match path {
        [_, channel, field] if channel == "channel" => match field.as_str() {
            "title" => Some(Slot::ChannelTitle),
            "link" => Some(Slot::ChannelLink),
            "description" => Some(Slot::ChannelDescription),
            _ => None,
        },
        [_, channel, item, field] if channel == "channel" && item == "item" => {
            match field.as_str() {
                "title" => Some(Slot::ItemTitle),
                "link" => Some(Slot::ItemLink),
                "description" => Some(Slot::ItemDescription),
                "pubDate" => Some(Slot::ItemPubDate),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_item(path: &[String]) -> bool {
    matches!(path, [_, channel, item] if channel == "channel" && item == "item")
}

struct Builder {
    document: FeedDocument,
    item: Option<FeedItem>,
}

impl Builder {
    fn field(&mut self, slot: Slot) -> Option<&mut String> {
        match slot {
            Slot::ChannelTitle => Some(&mut self.document.title),
            Slot::ChannelLink => Some(&mut self.document.link),
            Slot::ChannelDescription => Some(&mut self.document.description),
            Slot::ItemTitle => self.item.as_mut().map(|i| &mut i.title),
            Slot::ItemLink => self.item.as_mut().map(|i| &mut i.link),
            Slot::ItemDescription => self.item.as_mut().map(|i| &mut i.description),
            Slot::ItemPubDate => self.item.as_mut().map(|i| &mut i.pub_date),
        }
    }

    fn open(&mut self, path: &[String]) {
        if is_item(path) {
            self.item = Some(FeedItem::default());
        } else if let Some(field) = slot_for(path).and_then(|slot| self.field(slot)) {
            // A repeated element replaces the earlier value.
            field.clear();
        }
    }

    fn close(&mut self, path: &[String]) {
        if is_item(path) {
            if let Some(item) = self.item.take() {
                self.document.items.push(item);
            }
        } else if let Some(field) = slot_for(path).and_then(|slot| self.field(slot)) {
            // Fragments keep their spacing; only the finished field is trimmed.
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
    }

    fn text(&mut self, path: &[String], text: &str) {
        if let Some(field) = slot_for(path).and_then(|slot| self.field(slot)) {
            field.push_str(text);
        }
    }
}

/// Parse an RSS 2.0 body into a [`FeedDocument`].
///
/// Channel and item titles and descriptions are HTML-unescaped after
/// parsing; see [`unescape_entities`].
///
/// # Errors
///
/// Returns [`ParseError`] for invalid XML, an empty body, or a body that
/// ends with elements still open.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let mut reader = Reader::from_reader(bytes);

    let mut builder = Builder {
        document: FeedDocument::default(),
        item: None,
    };
    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(ParseError::Xml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })
            }
        };

        match event {
            Event::Start(e) => {
                saw_root = true;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                builder.open(&path);
            }
            Event::Empty(e) => {
                saw_root = true;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                builder.open(&path);
                builder.close(&path);
                path.pop();
            }
            Event::End(_) => {
                builder.close(&path);
                path.pop();
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| ParseError::Xml {
                    position: reader.buffer_position(),
                    message: err.to_string(),
                })?;
                builder.text(&path, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                builder.text(&path, &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ParseError::Empty);
    }
    if let Some(open) = path.last() {
        return Err(ParseError::Truncated(open.clone()));
    }

    let mut document = builder.document;
    document.title = unescape_entities(&document.title);
    document.description = unescape_entities(&document.description);
    for item in &mut document.items {
        item.title = unescape_entities(&item.title);
        item.description = unescape_entities(&item.description);
    }
    Ok(document)
}

/// Decode HTML entities (`&amp;`, `&eacute;`, `&#8217;`, ...) to literal
/// characters. Plain text passes through unchanged.
pub fn unescape_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml"/>
    <description>Recent content on Boot.dev Blog</description>
    <item>
        <title>First &amp;amp; Foremost</title>
        <link>https://blog.boot.dev/first/</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate>
        <description><![CDATA[<p>Hello &amp; welcome</p>]]></description>
    </item>
    <item>
        <title>Second</title>
        <link>https://blog.boot.dev/second/</link>
        <pubDate>Tue, 03 Jan 2006 15:04:05 +0000</pubDate>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        assert_eq!(doc.title, "Boot.dev Blog");
        assert_eq!(doc.link, "https://blog.boot.dev/");
        assert_eq!(doc.description, "Recent content on Boot.dev Blog");
        assert_eq!(doc.items.len(), 2);

        assert_eq!(doc.items[0].title, "First & Foremost");
        assert_eq!(doc.items[0].link, "https://blog.boot.dev/first/");
        assert_eq!(doc.items[0].pub_date, "Mon, 02 Jan 2006 15:04:05 +0000");
        assert_eq!(doc.items[0].description, "<p>Hello & welcome</p>");

        assert_eq!(doc.items[1].title, "Second");
        assert_eq!(doc.items[1].description, "");
    }

    #[test]
    fn test_atom_link_does_not_clobber_channel_link() {
        let doc = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        assert_eq!(doc.link, "https://blog.boot.dev/");
    }

    #[test]
    fn test_items_keep_document_order() {
        let doc = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        let links: Vec<&str> = doc.items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://blog.boot.dev/first/", "https://blog.boot.dev/second/"]
        );
    }

    #[test]
    fn test_channel_without_items() {
        let doc = parse_feed(br#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#)
            .unwrap();
        assert_eq!(doc.title, "Empty");
        assert!(doc.items.is_empty());
    }

    #[test]
    fn test_nested_titles_are_ignored() {
        let xml = br#"<rss><channel>
            <title>Outer</title>
            <image><title>Logo</title><url>https://example.com/logo.png</url></image>
        </channel></rss>"#;
        let doc = parse_feed(xml).unwrap();
        assert_eq!(doc.title, "Outer");
    }

    #[test]
    fn test_text_around_cdata_keeps_spacing() {
        let xml = br#"<rss><channel><item>
            <title>Rust <![CDATA[&]]> Go</title>
        </item></channel></rss>"#;
        let doc = parse_feed(xml).unwrap();
        assert_eq!(doc.items[0].title, "Rust & Go");
    }

    #[test]
    fn test_text_around_inline_element_keeps_spacing() {
        let xml = br#"<rss><channel><item>
            <description>Hello <b>x</b> world</description>
        </item></channel></rss>"#;
        let doc = parse_feed(xml).unwrap();
        assert_eq!(doc.items[0].description, "Hello  world");
    }

    #[test]
    fn test_field_padding_is_trimmed_once_closed() {
        let xml = b"<rss><channel><title>\n   Padded  \n</title><item><pubDate>\n  Mon, 02 Jan 2006 15:04:05 GMT\n</pubDate></item></channel></rss>";
        let doc = parse_feed(xml).unwrap();
        assert_eq!(doc.title, "Padded");
        assert_eq!(doc.items[0].pub_date, "Mon, 02 Jan 2006 15:04:05 GMT");
    }

    #[test]
    fn test_self_closing_item_is_kept() {
        let doc = parse_feed(b"<rss><channel><item/></channel></rss>").unwrap();
        assert_eq!(doc.items, vec![FeedItem::default()]);
    }

    #[test]
    fn test_unterminated_tag_is_malformed() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }

    #[test]
    fn test_mismatched_end_tag_is_malformed() {
        let result = parse_feed(b"<rss><channel><item></channel></rss>");
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        assert!(parse_feed(b"<rss><channel><title>Cut off").is_err());
        assert!(parse_feed(b"<rss><channel><item><title>x</title></item>").is_err());
    }

    #[test]
    fn test_empty_body_is_malformed() {
        assert!(matches!(parse_feed(b""), Err(ParseError::Empty)));
        assert!(matches!(parse_feed(b"   \n"), Err(ParseError::Empty)));
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape_entities("A &amp; B"), "A & B");
        assert_eq!(unescape_entities("caf&eacute; &#8217;s"), "café ’s");
        assert_eq!(unescape_entities("plain text"), "plain text");
    }

    #[test]
    fn test_unescape_is_idempotent_on_decoded_text() {
        let once = unescape_entities("A &amp; B");
        assert_eq!(unescape_entities(&once), once);
    }

    proptest! {
        #[test]
        fn prop_unescape_idempotent_without_ampersands(text in "[^&]{0,64}") {
            let once = unescape_entities(&text);
            prop_assert_eq!(&once, &text);
            prop_assert_eq!(unescape_entities(&once), once);
        }
    }
}
