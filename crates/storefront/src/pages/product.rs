//! Product details page.

use crate::locator::Locator;
use crate::page::BasePage;
use crate::pages::parse_price;
use crate::result::{StorefrontError, StorefrontResult};

/// Product page at `/product/{id}`
#[derive(Debug)]
pub struct ProductPage<'s> {
    base: BasePage<'s>,
}

page_object!(ProductPage, "/product/:id");

impl ProductPage<'_> {
    pub const PRODUCT_TITLE: Locator = Locator::css(".product-title h1");
    pub const PRODUCT_PRICE: Locator = Locator::css(".product-price");
    pub const PRODUCT_DESCRIPTION: Locator = Locator::css(".product-description");
    pub const PRODUCT_IMAGE: Locator = Locator::css(".product-image img");
    pub const QUANTITY_INPUT: Locator = Locator::id("quantity");
    pub const ADD_TO_CART_BUTTON: Locator = Locator::css(".add-to-cart-btn");
    pub const ADD_TO_WISHLIST_BUTTON: Locator = Locator::css(".add-to-wishlist-btn");
    pub const PRODUCT_RATING: Locator = Locator::css(".product-rating");
    pub const SIZE_OPTIONS: Locator = Locator::css(".size-options .size-option");
    pub const COLOR_OPTIONS: Locator = Locator::css(".color-options .color-option");
    pub const CART_SUCCESS_MESSAGE: Locator = Locator::css(".cart-success");
    pub const REVIEWS_TAB: Locator = Locator::css("a[href='#reviews']");
    pub const RELATED_PRODUCTS: Locator = Locator::css(".related-products .product-item");
    pub const WISHLIST_SUCCESS_MESSAGE: Locator = Locator::css(".wishlist-success-message");

    /// Open the page of product `product_id`
    pub fn open_product(&mut self, product_id: &str) -> StorefrontResult<&mut Self> {
        self.base.navigate(&format!("/product/{product_id}"))?;
        Ok(self)
    }

    pub fn get_product_title(&mut self) -> StorefrontResult<String> {
        self.read_text(&Self::PRODUCT_TITLE, None)
    }

    /// Displayed price without currency symbol or grouping
    pub fn get_product_price(&mut self) -> StorefrontResult<f64> {
        let raw = self.read_text(&Self::PRODUCT_PRICE, None)?;
        parse_price(&raw).map_err(|err| {
            self.fail("get_product_price", Some(&Self::PRODUCT_PRICE), &Self::PRODUCT_PRICE, None, err)
        })
    }

    pub fn get_product_description(&mut self) -> StorefrontResult<String> {
        self.read_text(&Self::PRODUCT_DESCRIPTION, None)
    }

    /// Whether the main product image is shown
    pub fn is_product_image_displayed(&mut self) -> bool {
        self.is_visible(&Self::PRODUCT_IMAGE, None)
    }

    /// Rating text, e.g. "4.5 out of 5"
    pub fn get_product_rating(&mut self) -> StorefrontResult<String> {
        self.read_text(&Self::PRODUCT_RATING, None)
    }

    pub fn set_quantity(&mut self, quantity: u32) -> StorefrontResult<&mut Self> {
        self.type_text(&Self::QUANTITY_INPUT, &quantity.to_string(), None)?;
        Ok(self)
    }

    pub fn add_to_cart(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::ADD_TO_CART_BUTTON, None)?;
        Ok(self)
    }

    pub fn add_to_wishlist(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::ADD_TO_WISHLIST_BUTTON, None)?;
        Ok(self)
    }

    /// Click the size swatch whose text is exactly `size`
    pub fn select_size(&mut self, size: &str) -> StorefrontResult<&mut Self> {
        for option in self.find_all(&Self::SIZE_OPTIONS, None)? {
            if self.read_text(&option, None)? == size {
                self.click(option, None)?;
                return Ok(self);
            }
        }
        let error = StorefrontError::OptionNotFound {
            locator: Self::SIZE_OPTIONS,
            option: size.to_string(),
        };
        Err(self.fail("select_size", Some(&Self::SIZE_OPTIONS), &size, None, error))
    }

    /// Click the first color swatch whose `title` contains `color`, ignoring case
    pub fn select_color(&mut self, color: &str) -> StorefrontResult<&mut Self> {
        let wanted = color.to_lowercase();
        for option in self.find_all(&Self::COLOR_OPTIONS, None)? {
            let title = self.attribute(&option, "title", None)?.unwrap_or_default();
            if title.to_lowercase().contains(&wanted) {
                self.click(option, None)?;
                return Ok(self);
            }
        }
        let error = StorefrontError::OptionNotFound {
            locator: Self::COLOR_OPTIONS,
            option: color.to_string(),
        };
        Err(self.fail("select_color", Some(&Self::COLOR_OPTIONS), &color, None, error))
    }

    pub fn is_add_to_cart_success_displayed(&mut self) -> bool {
        self.is_visible(&Self::CART_SUCCESS_MESSAGE, None)
    }

    pub fn get_cart_success_message(&mut self) -> StorefrontResult<String> {
        self.read_text(&Self::CART_SUCCESS_MESSAGE, None)
    }

    pub fn is_add_to_wishlist_success_displayed(&mut self) -> bool {
        self.is_visible(&Self::WISHLIST_SUCCESS_MESSAGE, None)
    }

    pub fn get_wishlist_success_message(&mut self) -> StorefrontResult<String> {
        self.read_text(&Self::WISHLIST_SUCCESS_MESSAGE, None)
    }

    pub fn click_reviews_tab(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::REVIEWS_TAB, None)?;
        Ok(self)
    }

    pub fn get_related_products_count(&mut self) -> StorefrontResult<usize> {
        Ok(self.find_all(&Self::RELATED_PRODUCTS, None)?.len())
    }

    /// Click the related product at `index` (0-based)
    pub fn click_related_product(&mut self, index: usize) -> StorefrontResult<&mut Self> {
        let related = self.find_all(&Self::RELATED_PRODUCTS, None)?;
        let len = related.len();
        let Some(product) = related.into_iter().nth(index) else {
            let error = StorefrontError::IndexOutOfRange {
                what: "related product",
                index,
                len,
            };
            return Err(self.fail(
                "click_related_product",
                Some(&Self::RELATED_PRODUCTS),
                &Self::RELATED_PRODUCTS,
                None,
                error,
            ));
        };
        self.click(product, None)?;
        Ok(self)
    }
}
