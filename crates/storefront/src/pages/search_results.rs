//! Search results listing.

use std::time::Duration;

use serde::Serialize;

use crate::locator::{Locator, Strategy};
use crate::page::BasePage;
use crate::pages::parse_price;
use crate::result::StorefrontResult;
use crate::session::ElementHandle;

/// How long [`SearchResultsPage::is_no_results_message_displayed`] waits by default
pub const NO_RESULTS_TIMEOUT: Duration = Duration::from_secs(5);

/// A listed product as displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResultItem {
    pub name: String,
    /// Price text as shown, currency symbol included
    pub price: String,
}

impl SearchResultItem {
    /// Price as a number
    pub fn price_value(&self) -> StorefrontResult<f64> {
        parse_price(&self.price)
    }
}

/// Results page shown after a search
#[derive(Debug)]
pub struct SearchResultsPage<'s> {
    base: BasePage<'s>,
}

page_object!(SearchResultsPage, "/search");

impl SearchResultsPage<'_> {
    pub const SEARCH_RESULTS_CONTAINER: Locator = Locator::id("search-results-container");
    pub const PRODUCT_ITEM: Locator = Locator::css(".product-item");
    pub const PRODUCT_NAME: Locator = Locator::css(".product-name");
    pub const PRODUCT_PRICE: Locator = Locator::css(".product-price");
    pub const NO_RESULTS_MESSAGE: Locator = Locator::id("no-results-message");
    pub const SORT_OPTIONS: Locator = Locator::id("sort-options");
    pub const FILTER_CATEGORY_BUTTON: Locator =
        Locator::xpath("//button[contains(text(), 'Category')]");

    /// Whether the results container becomes visible
    pub fn is_results_page_loaded(&mut self, timeout: Option<Duration>) -> bool {
        self.is_visible(&Self::SEARCH_RESULTS_CONTAINER, timeout)
    }

    /// Number of listed products; 0 when the results container is not shown
    pub fn get_results_count(&mut self) -> StorefrontResult<usize> {
        if !self.is_visible(&Self::SEARCH_RESULTS_CONTAINER, None) {
            return Ok(0);
        }
        Ok(self.find_all(&Self::PRODUCT_ITEM, None)?.len())
    }

    /// Name of a listed item, `None` if the item has no name element
    fn item_name(&mut self, item: &ElementHandle) -> StorefrontResult<Option<String>> {
        match self.find_present_within(item, &Self::PRODUCT_NAME)? {
            Some(name) => self.read_text(name, None).map(Some),
            None => {
                tracing::debug!(item = item.id(), "result item without a name");
                Ok(None)
            }
        }
    }

    /// Listed products paired with their names, in page order
    fn named_items(&mut self) -> StorefrontResult<Vec<(ElementHandle, String)>> {
        let mut named = Vec::new();
        for item in self.find_all(&Self::PRODUCT_ITEM, None)? {
            if let Some(name) = self.item_name(&item)? {
                named.push((item, name));
            }
        }
        Ok(named)
    }

    pub fn get_product_names(&mut self) -> StorefrontResult<Vec<String>> {
        Ok(self
            .named_items()?
            .into_iter()
            .map(|(_, name)| name)
            .collect())
    }

    /// Whether a product with this name is listed, ignoring case
    pub fn is_product_listed(&mut self, name: &str) -> StorefrontResult<bool> {
        let wanted = name.to_lowercase();
        Ok(self
            .get_product_names()?
            .iter()
            .any(|listed| listed.to_lowercase() == wanted))
    }

    /// Click the listed product with this name; `false` if none matches
    pub fn click_product_by_name(&mut self, name: &str) -> StorefrontResult<bool> {
        let wanted = name.to_lowercase();
        let item = self
            .named_items()?
            .into_iter()
            .find(|(_, listed)| listed.to_lowercase() == wanted);
        match item {
            Some((item, _)) => {
                self.click(item, None)?;
                Ok(true)
            }
            None => {
                tracing::debug!(name, "product not listed");
                Ok(false)
            }
        }
    }

    /// Whether the "no results" message becomes visible (default wait 5 s)
    pub fn is_no_results_message_displayed(&mut self, timeout: Option<Duration>) -> bool {
        self.is_visible(
            &Self::NO_RESULTS_MESSAGE,
            Some(timeout.unwrap_or(NO_RESULTS_TIMEOUT)),
        )
    }

    /// Pick a sort order by its visible text; `false` if the dropdown is not shown
    pub fn select_sort_option(&mut self, option_text: &str) -> StorefrontResult<bool> {
        if !self.is_visible(&Self::SORT_OPTIONS, None) {
            tracing::warn!(option = option_text, "sort dropdown not shown");
            return Ok(false);
        }
        self.select_option_by_text(&Self::SORT_OPTIONS, option_text, None)?;
        Ok(true)
    }

    /// Open the category filter and choose `category`.
    ///
    /// Returns `false` if the filter button or the category link never shows.
    pub fn apply_category_filter(&mut self, category: &str) -> StorefrontResult<bool> {
        if !self.is_visible(&Self::FILTER_CATEGORY_BUTTON, None) {
            tracing::warn!(category, "category filter not shown");
            return Ok(false);
        }
        self.click(&Self::FILTER_CATEGORY_BUTTON, None)?;
        let link = Locator::dynamic(Strategy::LinkText, category);
        if !self.is_visible(&link, None) {
            tracing::warn!(category, "category not offered");
            return Ok(false);
        }
        self.click(link, None)?;
        Ok(true)
    }

    /// Name and price of the listed product with this name, ignoring case.
    ///
    /// `None` when no such product is listed or its card shows no price.
    pub fn get_search_result_item_details(
        &mut self,
        name: &str,
    ) -> StorefrontResult<Option<SearchResultItem>> {
        let wanted = name.to_lowercase();
        let item = self
            .named_items()?
            .into_iter()
            .find(|(_, listed)| listed.to_lowercase() == wanted);
        let Some((item, name)) = item else {
            return Ok(None);
        };
        let Some(price) = self.find_present_within(&item, &Self::PRODUCT_PRICE)? else {
            tracing::debug!(name = %name, "result item without a price");
            return Ok(None);
        };
        let price = self.read_text(price, None)?;
        Ok(Some(SearchResultItem { name, price }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::config::Config;
    use crate::page::HasSearchBar;
    use crate::report::RecordingObserver;
    use crate::session::{FakeDom, FakeElement, FakeSession, Session};

    const SHORT: Option<Duration> = Some(Duration::from_millis(100));

    fn item(name: &str, price: &str, href: &str) -> FakeElement {
        FakeElement::new("a")
            .class("product-item")
            .attr("href", href)
            .children([
                FakeElement::new("span").class("product-name").text(name),
                FakeElement::new("span").class("product-price").text(price),
            ])
    }

    fn results(dom: &mut FakeDom) {
        let term = dom.query_param("q").unwrap_or_default();
        dom.append(
            FakeElement::new("input")
                .id("search-input")
                .value(term.as_str())
                .on_enter(|dom| {
                    let term = dom.value(&Locator::id("search-input")).unwrap_or_default();
                    dom.navigate(format!("http://shop.test/search?q={term}"));
                }),
        );
        if term.contains("XYZ") {
            dom.append(FakeElement::new("p").id("no-results-message").text("No products found"));
            return;
        }
        dom.append(FakeElement::new("div").id("search-results-container").children([
            item("Desk Lamp", "$39.00", "http://shop.test/product/7"),
            item("Floor Lamp", "$1,120.50", "http://shop.test/product/8"),
            FakeElement::new("div").class("product-item").text("Sponsored"),
        ]));
        dom.append(FakeElement::new("select").id("sort-options").children([
            FakeElement::new("option").value("relevance").text("Relevance"),
            FakeElement::new("option").value("price_asc").text("Price: Low to High"),
        ]));
        dom.append(FakeElement::new("button").text("Category").on_click(|dom| {
            dom.append(
                FakeElement::new("a")
                    .attr("href", "http://shop.test/search?q=lamp&cat=lighting")
                    .text("Lighting"),
            );
        }));
    }

    fn setup(term: &str) -> (FakeSession, Config) {
        let mut session = FakeSession::new().with_route("http://shop.test/search", results);
        session
            .navigate(&format!("http://shop.test/search?q={term}"))
            .unwrap();
        let config = Config::default()
            .with_base_url("http://shop.test")
            .with_default_timeout(Duration::from_millis(200))
            .with_poll_interval(Duration::from_millis(10));
        (session, config)
    }

    #[test]
    fn test_listing() {
        let (mut session, config) = setup("lamp");
        let mut page = SearchResultsPage::new(&mut session, &config);
        assert!(page.is_results_page_loaded(SHORT));
        assert_eq!(page.get_results_count().unwrap(), 3);
        assert_eq!(page.get_product_names().unwrap(), vec!["Desk Lamp", "Floor Lamp"]);
        assert!(page.is_product_listed("desk LAMP").unwrap());
        assert!(!page.is_product_listed("Lamp").unwrap());
    }

    #[test]
    fn test_item_details() {
        let (mut session, config) = setup("lamp");
        let mut page = SearchResultsPage::new(&mut session, &config);
        let details = page.get_search_result_item_details("floor lamp").unwrap().unwrap();
        assert_eq!(details.name, "Floor Lamp");
        assert_eq!(details.price, "$1,120.50");
        assert!((details.price_value().unwrap() - 1120.5).abs() < f64::EPSILON);
        assert!(page.get_search_result_item_details("Chair").unwrap().is_none());
    }

    #[test]
    fn test_item_without_price_has_no_details() {
        let mut session = FakeSession::new().with_route("http://shop.test/search", |dom| {
            dom.append(FakeElement::new("div").id("search-results-container").children([
                FakeElement::new("a")
                    .class("product-item")
                    .child(FakeElement::new("span").class("product-name").text("Gift Card")),
                item("Desk Lamp", "$39.00", "http://shop.test/product/7"),
            ]));
        });
        session.navigate("http://shop.test/search?q=gift").unwrap();
        let config = Config::default()
            .with_base_url("http://shop.test")
            .with_default_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(10));
        let observer = Arc::new(RecordingObserver::new());
        let mut page = SearchResultsPage::new(&mut session, &config).with_observer(observer.clone());

        let started = Instant::now();
        assert!(page.get_search_result_item_details("gift card").unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(observer.failures().is_empty());
        let lamp = page.get_search_result_item_details("Desk Lamp").unwrap().unwrap();
        assert_eq!(lamp.price, "$39.00");
    }

    #[test]
    fn test_no_results() {
        let (mut session, config) = setup("NonExistentProductXYZ123");
        let mut page = SearchResultsPage::new(&mut session, &config);
        assert_eq!(page.get_results_count().unwrap(), 0);
        assert!(page.is_no_results_message_displayed(None));
    }

    #[test]
    fn test_click_product_by_name() {
        let (mut session, config) = setup("lamp");
        let mut page = SearchResultsPage::new(&mut session, &config);
        assert!(!page.click_product_by_name("Chair").unwrap());
        assert!(page.click_product_by_name("desk lamp").unwrap());
        assert_eq!(page.current_path().unwrap(), "/product/7");
    }

    #[test]
    fn test_sort_and_filter() {
        let (mut session, config) = setup("lamp");
        let mut page = SearchResultsPage::new(&mut session, &config);
        assert!(page.select_sort_option("Price: Low to High").unwrap());
        assert!(page.apply_category_filter("Lighting").unwrap());
        assert!(page.current_url().unwrap().ends_with("cat=lighting"));
        assert!(!page.apply_category_filter("Garden").unwrap());
    }

    #[test]
    fn test_search_again_from_results() {
        let (mut session, config) = setup("lamp");
        let mut page = SearchResultsPage::new(&mut session, &config);
        let mut again = page.search("NonExistentProductXYZ123").unwrap();
        assert_eq!(again.get_results_count().unwrap(), 0);
        assert!(again.is_no_results_message_displayed(SHORT));
    }
}
