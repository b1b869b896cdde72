use super::{ExtractionError, PageExtractor, RecipeRecord};
use crate::browser::LoadedPage;
use chrono::Utc;
use scraper::{ElementRef, Html, Node, Selector};

const SUMMARY: &str = ".wprm-recipe-summary";
const META: &str = ".wprm-recipe-meta-container div";
const INGREDIENT: &str = ".wprm-recipe-ingredient";
const INSTRUCTION: &str = ".wprm-recipe-instruction";
const NUTRITION: &str = ".wprm-nutrition-label-text-nutrition-container";
const COMMENT: &str = ".comment-list li article";

const INGREDIENT_EXCLUDED: &[&str] = &["wprm-checkbox-container"];
const COMMENT_EXCLUDED: &[&str] = &["reply", "comment-metadata"];

/// Metadata cells nest label/value spans; deeper nodes are tooltips and icons
const META_DEPTH: usize = 3;

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::Selector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

/// Extracts WP Recipe Maker recipe cards
#[derive(Debug)]
pub struct RecipeExtractor {
    required_marker: String,
    ready: Selector,
    summary: Selector,
    meta: Selector,
    ingredient: Selector,
    instruction: Selector,
    nutrition: Selector,
    comment: Selector,
}

impl RecipeExtractor {
    /// `ready_selector` must match once the recipe card has rendered;
    /// `required_marker` must appear in the page source.
    pub fn new(ready_selector: &str, required_marker: &str) -> Result<Self, ExtractionError> {
        Ok(Self {
            required_marker: required_marker.to_string(),
            ready: parse_selector(ready_selector)?,
            summary: parse_selector(SUMMARY)?,
            meta: parse_selector(META)?,
            ingredient: parse_selector(INGREDIENT)?,
            instruction: parse_selector(INSTRUCTION)?,
            nutrition: parse_selector(NUTRITION)?,
            comment: parse_selector(COMMENT)?,
        })
    }

    fn all_text(&self, document: &Html, selector: &Selector) -> Vec<String> {
        document
            .select(selector)
            .map(|el| clean(&el.text().collect::<String>()))
            .collect()
    }

    fn text_excluding(
        &self,
        document: &Html,
        selector: &Selector,
        excluded: &[&str],
    ) -> Vec<String> {
        document
            .select(selector)
            .map(|el| {
                let mut text = String::new();
                collect_text(el, excluded, usize::MAX, &mut text);
                clean(&text)
            })
            .collect()
    }
}

/// Appends the text below `element`, skipping excluded classes and anything
/// deeper than `depth` levels
fn collect_text(element: ElementRef<'_>, excluded: &[&str], depth: usize, out: &mut String) {
    if depth == 0 {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if el.classes().any(|class| excluded.contains(&class)) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, excluded, depth - 1, out);
                }
            }
            _ => {}
        }
    }
}

/// Collapses whitespace runs, tabs and newlines included
fn clean(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PageExtractor for RecipeExtractor {
    fn extract(&self, page: &LoadedPage) -> Result<RecipeRecord, ExtractionError> {
        let document = Html::parse_document(&page.html);

        if document.select(&self.ready).next().is_none() {
            return Err(ExtractionError::NotARecipe(
                "recipe content did not load".to_string(),
            ));
        }
        if !page.html.contains(&self.required_marker) {
            return Err(ExtractionError::NotARecipe(format!(
                "'{}' not found",
                self.required_marker
            )));
        }

        let summary = document
            .select(&self.summary)
            .next()
            .map(|el| clean(&el.text().collect::<String>()))
            .unwrap_or_default();

        let metadata = document
            .select(&self.meta)
            .map(|el| {
                let mut text = String::new();
                collect_text(el, &[], META_DEPTH, &mut text);
                clean(&text)
            })
            .collect();

        Ok(RecipeRecord {
            url: page.url.clone(),
            summary,
            metadata,
            ingredients: self.text_excluding(&document, &self.ingredient, INGREDIENT_EXCLUDED),
            instructions: self.all_text(&document, &self.instruction),
            nutrition: self.all_text(&document, &self.nutrition),
            comments: self.text_excluding(&document, &self.comment, COMMENT_EXCLUDED),
            crawled_at: Utc::now(),
        })
    }
}
