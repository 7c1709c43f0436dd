//! HTML extraction for listing and detail pages
//!
//! Extraction is pure: it takes HTML and returns stubs or records, never
//! fails, and never touches the network. Anything missing from the markup
//! becomes an empty value.

use crate::config::{ExtractorConfig, FieldKind};
use crate::state::{FieldValue, Record, RecordStub};
use crate::url::{query_param, resolve_link};
use crate::{ConfigError, ConfigResult};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// Turns rendered HTML into stubs and records
pub trait Extractor: Send + Sync + 'static {
    /// Parses a listing page into stubs, in document order
    ///
    /// Links are resolved against `page_url`. A page without the expected
    /// structure yields an empty list.
    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<RecordStub>;

    /// Builds a full record from a stub and its detail page
    fn enrich(&self, stub: RecordStub, html: &str) -> Record;
}

/// Extractor driven by the CSS selectors in `[extractor]`
#[derive(Debug)]
pub struct SelectorExtractor {
    title: Selector,
    parent: Selector,
    headings: Selector,
    fields: Vec<CompiledField>,
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Selector,
    kind: CompiledKind,
}

#[derive(Debug)]
enum CompiledKind {
    Text,
    List,
    AfterHeading {
        heading: String,
    },
    ListAfterHeading {
        heading: String,
        container: Selector,
    },
    LinkParam {
        param: String,
    },
    Range {
        suffix: String,
    },
    Grouped {
        label: Selector,
        values: Selector,
        label_key: String,
        values_key: String,
    },
}

impl CompiledKind {
    /// Value used when the page has nothing for this field
    fn empty_value(&self) -> FieldValue {
        match self {
            Self::List | Self::ListAfterHeading { .. } | Self::Grouped { .. } => {
                FieldValue::List(Vec::new())
            }
            _ => FieldValue::Text(String::new()),
        }
    }
}

fn compile(selector: &str) -> ConfigResult<Selector> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

impl SelectorExtractor {
    /// Compiles every selector in the extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> ConfigResult<Self> {
        let fields = config
            .fields
            .iter()
            .map(|rule| {
                let kind = match &rule.kind {
                    FieldKind::Text => CompiledKind::Text,
                    FieldKind::List => CompiledKind::List,
                    FieldKind::AfterHeading { heading } => CompiledKind::AfterHeading {
                        heading: heading.trim().to_string(),
                    },
                    FieldKind::ListAfterHeading { heading, container } => {
                        CompiledKind::ListAfterHeading {
                            heading: heading.trim().to_string(),
                            container: compile(container)?,
                        }
                    }
                    FieldKind::LinkParam { param } => CompiledKind::LinkParam {
                        param: param.clone(),
                    },
                    FieldKind::Range { suffix } => CompiledKind::Range {
                        suffix: suffix.clone(),
                    },
                    FieldKind::Grouped {
                        label,
                        values,
                        label_key,
                        values_key,
                    } => CompiledKind::Grouped {
                        label: compile(label)?,
                        values: compile(values)?,
                        label_key: label_key.clone(),
                        values_key: values_key.clone(),
                    },
                };

                Ok(CompiledField {
                    name: rule.name.clone(),
                    selector: compile(&rule.selector)?,
                    kind,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            title: compile(&config.title_selector)?,
            parent: compile(&config.parent_selector)?,
            headings: compile("h1, h2, h3, h4, h5, h6")?,
            fields,
        })
    }

    fn extract_field(&self, document: &Html, field: &CompiledField, base: Option<&Url>) -> Option<FieldValue> {
        match &field.kind {
            CompiledKind::Text => document
                .select(&field.selector)
                .next()
                .map(|el| FieldValue::Text(element_text(el))),

            CompiledKind::List => Some(FieldValue::from(
                document
                    .select(&field.selector)
                    .map(element_text)
                    .collect::<Vec<_>>(),
            )),

            CompiledKind::AfterHeading { heading } => self
                .find_after_heading(document, heading, &field.selector)
                .map(|el| FieldValue::Text(element_text(el))),

            CompiledKind::ListAfterHeading { heading, container } => {
                let container = self.find_after_heading(document, heading, container)?;
                Some(FieldValue::from(
                    container
                        .select(&field.selector)
                        .map(element_text)
                        .collect::<Vec<_>>(),
                ))
            }

            CompiledKind::LinkParam { param } => {
                let href = document
                    .select(&field.selector)
                    .find_map(|el| el.value().attr("href"))?;
                let url = match base {
                    Some(base) => base.join(href).ok()?,
                    None => Url::parse(href).ok()?,
                };
                query_param(&url, param).map(FieldValue::Text)
            }

            CompiledKind::Range { suffix } => {
                let mut amounts = document.select(&field.selector).map(element_text);
                let low = amounts.next()?;
                let high = amounts.next()?;
                Some(FieldValue::Text(format!("{} - {}{}", low, high, suffix)))
            }

            CompiledKind::Grouped {
                label,
                values,
                label_key,
                values_key,
            } => {
                let groups = document
                    .select(&field.selector)
                    .filter_map(|item| {
                        let label_text = item.select(label).next().map(element_text)?;
                        let value_texts: Vec<String> =
                            item.select(values).map(element_text).collect();

                        let mut group = BTreeMap::new();
                        group.insert(label_key.clone(), FieldValue::Text(label_text));
                        group.insert(values_key.clone(), FieldValue::from(value_texts));
                        Some(FieldValue::Map(group))
                    })
                    .collect();
                Some(FieldValue::List(groups))
            }
        }
    }

    /// Finds the first element matching `selector` after the heading titled `heading`
    fn find_after_heading<'a>(
        &self,
        document: &'a Html,
        heading: &str,
        selector: &Selector,
    ) -> Option<ElementRef<'a>> {
        let anchor = document
            .select(&self.headings)
            .find(|h| element_text(*h) == heading)?;

        document
            .root_element()
            .descendants()
            .skip_while(|node| node.id() != anchor.id())
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|el| selector.matches(el))
    }
}

impl Extractor for SelectorExtractor {
    fn parse_listing(&self, html: &str, page_url: &Url) -> Vec<RecordStub> {
        let document = Html::parse_document(html);

        let titles: Vec<ElementRef> = document.select(&self.title).collect();
        let parents: Vec<ElementRef> = document.select(&self.parent).collect();

        if titles.is_empty() || parents.is_empty() {
            tracing::warn!(
                "No listings found on {}. Verify the HTML structure and selectors.",
                page_url
            );
            return Vec::new();
        }

        if titles.len() != parents.len() {
            tracing::warn!(
                "Listing page {} has {} titles but {} parents; pairing in order",
                page_url,
                titles.len(),
                parents.len()
            );
        }

        titles
            .into_iter()
            .zip(parents)
            .filter_map(|(title, parent)| {
                let title_text = element_text(title);
                let Some(href) = enclosing_link(title) else {
                    tracing::warn!("Listing '{}' has no link; skipping", title_text);
                    return None;
                };
                let Some(link) = resolve_link(href, page_url) else {
                    tracing::warn!("Listing '{}' has unusable link '{}'", title_text, href);
                    return None;
                };

                match RecordStub::new(title_text, element_text(parent), link.to_string()) {
                    Ok(stub) => Some(stub),
                    Err(e) => {
                        tracing::warn!("Skipping listing with link {}: {}", link, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn enrich(&self, stub: RecordStub, html: &str) -> Record {
        let document = Html::parse_document(html);
        let base = Url::parse(&stub.link).ok();

        let mut record = Record::new(stub);
        for field in &self.fields {
            let value = self
                .extract_field(&document, field, base.as_ref())
                .unwrap_or_else(|| field.kind.empty_value());
            record.set_field(field.name.clone(), value);
        }
        record
    }
}

/// Trimmed text content of an element and its descendants
fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// The href of the element itself or of its nearest `<a href>` ancestor
fn enclosing_link(element: ElementRef<'_>) -> Option<&str> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())
        .and_then(|el| el.value().attr("href"))
}
