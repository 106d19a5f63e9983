//! Storefront screens.
//!
//! Each page wraps a [`BasePage`](crate::page::BasePage), dereferences to it
//! for the shared primitives, and declares its locators as associated
//! constants.

use crate::result::{StorefrontError, StorefrontResult};

/// Constructors, `Deref` to the base page, [`PageObject`](crate::PageObject)
/// and [`HasSearchBar`](crate::HasSearchBar) for a page struct holding a
/// single `base` field.
macro_rules! page_object {
    ($page:ident, $pattern:literal) => {
        impl<'s> $page<'s> {
            /// Page over `session` using the configured default timeout
            pub fn new(
                session: &'s mut dyn $crate::session::Session,
                config: &'s $crate::config::Config,
            ) -> Self {
                Self::from_base($crate::page::BasePage::new(session, config))
            }

            pub(crate) fn from_base(base: $crate::page::BasePage<'s>) -> Self {
                Self { base }
            }

            /// Report steps and failures to `observer`
            #[must_use]
            pub fn with_observer(
                self,
                observer: ::std::sync::Arc<dyn $crate::report::InteractionObserver>,
            ) -> Self {
                Self::from_base(self.base.with_observer(observer))
            }

            /// Override the default timeout
            #[must_use]
            pub fn with_timeout(self, timeout: ::std::time::Duration) -> Self {
                Self::from_base(self.base.with_timeout(timeout))
            }
        }

        impl<'s> ::std::ops::Deref for $page<'s> {
            type Target = $crate::page::BasePage<'s>;

            fn deref(&self) -> &Self::Target {
                &self.base
            }
        }

        impl ::std::ops::DerefMut for $page<'_> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.base
            }
        }

        impl $crate::page_object::PageObject for $page<'_> {
            fn url_pattern(&self) -> &str {
                $pattern
            }

            fn current_path(&self) -> $crate::result::StorefrontResult<String> {
                self.base.current_path()
            }
        }

        impl<'s> $crate::page::HasSearchBar<'s> for $page<'s> {
            fn base_page(&mut self) -> &mut $crate::page::BasePage<'s> {
                &mut self.base
            }
        }
    };
}

mod cart;
mod home;
mod login;
mod product;
mod search_results;

pub use cart::CartPage;
pub use home::HomePage;
pub use login::LoginPage;
pub use product::ProductPage;
pub use search_results::{SearchResultItem, SearchResultsPage, NO_RESULTS_TIMEOUT};

/// Parse a displayed amount such as `$1,299.00`
pub fn parse_price(raw: &str) -> StorefrontResult<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite())
        .ok_or_else(|| StorefrontError::InvalidValue {
            what: "price",
            value: raw.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod parse_price_tests {
        use super::*;

        #[test]
        fn test_strips_currency_and_grouping() {
            assert!((parse_price("$1,299.99").unwrap() - 1299.99).abs() < f64::EPSILON);
            assert!((parse_price(" 15 ").unwrap() - 15.0).abs() < f64::EPSILON);
        }

        #[test]
        fn test_rejects_text() {
            let err = parse_price("Free").unwrap_err();
            assert!(matches!(err, StorefrontError::InvalidValue { what: "price", .. }));
            assert!(parse_price("").is_err());
            assert!(parse_price("NaN").is_err());
        }
    }
}
