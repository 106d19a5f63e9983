//! Shopping cart.
//!
//! Row-indexed operations are 0-based and treat an index past the last row
//! as "no such row": getters return `None`, setters do nothing.

use crate::locator::Locator;
use crate::page::BasePage;
use crate::pages::parse_price;
use crate::result::{StorefrontError, StorefrontResult};
use crate::session::ElementHandle;

/// Cart page at `/cart`
#[derive(Debug)]
pub struct CartPage<'s> {
    base: BasePage<'s>,
}

page_object!(CartPage, "/cart");

impl CartPage<'_> {
    pub const CART_ITEMS: Locator = Locator::css(".cart-item");
    pub const CART_ITEM_NAME: Locator = Locator::css(".cart-item-name");
    pub const CART_ITEM_PRICE: Locator = Locator::css(".cart-item-price");
    pub const CART_ITEM_QUANTITY: Locator = Locator::css(".cart-item-quantity input");
    pub const CART_ITEM_TOTAL: Locator = Locator::css(".cart-item-total");
    pub const CART_ITEM_REMOVE: Locator = Locator::css(".cart-item-remove");
    pub const UPDATE_CART_BUTTON: Locator = Locator::css(".update-cart-btn");
    pub const CONTINUE_SHOPPING_BUTTON: Locator = Locator::css(".continue-shopping-btn");
    pub const CHECKOUT_BUTTON: Locator = Locator::css(".checkout-btn");
    pub const SUBTOTAL: Locator = Locator::css(".cart-subtotal .amount");
    pub const TAX: Locator = Locator::css(".cart-tax .amount");
    pub const SHIPPING: Locator = Locator::css(".cart-shipping .amount");
    pub const TOTAL: Locator = Locator::css(".cart-total .amount");
    pub const EMPTY_CART_MESSAGE: Locator = Locator::css(".empty-cart-message");
    pub const PROMO_CODE_INPUT: Locator = Locator::id("promo-code");
    pub const APPLY_PROMO_BUTTON: Locator = Locator::css(".apply-promo-btn");
    pub const PROMO_SUCCESS_MESSAGE: Locator = Locator::css(".promo-success");
    pub const PROMO_ERROR_MESSAGE: Locator = Locator::css(".promo-error");

    pub fn open(&mut self) -> StorefrontResult<&mut Self> {
        self.base.navigate("/cart")?;
        Ok(self)
    }

    pub fn get_cart_items_count(&mut self) -> StorefrontResult<usize> {
        Ok(self.find_all(&Self::CART_ITEMS, None)?.len())
    }

    /// Whether the empty-cart message is shown
    pub fn is_cart_empty(&mut self) -> bool {
        self.is_visible(&Self::EMPTY_CART_MESSAGE, None)
    }

    fn row_part(&mut self, index: usize, part: &Locator) -> StorefrontResult<Option<ElementHandle>> {
        let Some(row) = self.find_all(&Self::CART_ITEMS, None)?.into_iter().nth(index) else {
            tracing::debug!(index, "no cart row");
            return Ok(None);
        };
        self.find_one_within(&row, part, None).map(Some)
    }

    pub fn get_item_name(&mut self, index: usize) -> StorefrontResult<Option<String>> {
        match self.row_part(index, &Self::CART_ITEM_NAME)? {
            Some(name) => self.read_text(name, None).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_item_price(&mut self, index: usize) -> StorefrontResult<Option<f64>> {
        match self.row_part(index, &Self::CART_ITEM_PRICE)? {
            Some(price) => {
                let raw = self.read_text(price, None)?;
                parse_price(&raw).map(Some).map_err(|err| {
                    self.fail("get_item_price", Some(&Self::CART_ITEM_PRICE), &Self::CART_ITEM_PRICE, None, err)
                })
            }
            None => Ok(None),
        }
    }

    /// Quantity from the row's quantity input
    pub fn get_item_quantity(&mut self, index: usize) -> StorefrontResult<Option<u32>> {
        let Some(input) = self.row_part(index, &Self::CART_ITEM_QUANTITY)? else {
            return Ok(None);
        };
        let raw = self.attribute(input, "value", None)?.unwrap_or_default();
        match raw.trim().parse() {
            Ok(quantity) => Ok(Some(quantity)),
            Err(_) => {
                let error = StorefrontError::InvalidValue {
                    what: "quantity",
                    value: raw,
                };
                let locator = Self::CART_ITEM_QUANTITY;
                Err(self.fail("get_item_quantity", Some(&locator), &locator, None, error))
            }
        }
    }

    pub fn set_item_quantity(&mut self, quantity: u32, index: usize) -> StorefrontResult<&mut Self> {
        if let Some(input) = self.row_part(index, &Self::CART_ITEM_QUANTITY)? {
            self.type_text(input, &quantity.to_string(), None)?;
        }
        Ok(self)
    }

    pub fn remove_item(&mut self, index: usize) -> StorefrontResult<&mut Self> {
        if let Some(remove) = self.row_part(index, &Self::CART_ITEM_REMOVE)? {
            self.click(remove, None)?;
        }
        Ok(self)
    }

    pub fn update_cart(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::UPDATE_CART_BUTTON, None)?;
        Ok(self)
    }

    pub fn continue_shopping(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::CONTINUE_SHOPPING_BUTTON, None)?;
        Ok(self)
    }

    pub fn proceed_to_checkout(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::CHECKOUT_BUTTON, None)?;
        Ok(self)
    }

    fn amount(&mut self, locator: &Locator) -> StorefrontResult<f64> {
        let raw = self.read_text(locator, None)?;
        parse_price(&raw).map_err(|err| self.fail("amount", Some(locator), locator, None, err))
    }

    pub fn get_subtotal(&mut self) -> StorefrontResult<f64> {
        self.amount(&Self::SUBTOTAL)
    }

    pub fn get_tax(&mut self) -> StorefrontResult<f64> {
        self.amount(&Self::TAX)
    }

    pub fn get_shipping(&mut self) -> StorefrontResult<f64> {
        self.amount(&Self::SHIPPING)
    }

    pub fn get_total(&mut self) -> StorefrontResult<f64> {
        self.amount(&Self::TOTAL)
    }

    pub fn apply_promo_code(&mut self, code: &str) -> StorefrontResult<&mut Self> {
        self.type_text(&Self::PROMO_CODE_INPUT, code, None)?;
        self.click(&Self::APPLY_PROMO_BUTTON, None)?;
        Ok(self)
    }

    pub fn is_promo_success_displayed(&mut self) -> bool {
        self.is_visible(&Self::PROMO_SUCCESS_MESSAGE, None)
    }

    pub fn is_promo_error_displayed(&mut self) -> bool {
        self.is_visible(&Self::PROMO_ERROR_MESSAGE, None)
    }
}
