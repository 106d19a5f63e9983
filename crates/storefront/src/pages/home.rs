//! Landing page.

use crate::page::BasePage;
use crate::result::StorefrontResult;

/// Storefront landing page
#[derive(Debug)]
pub struct HomePage<'s> {
    base: BasePage<'s>,
}

page_object!(HomePage, "/");

impl HomePage<'_> {
    /// Open the landing page
    pub fn open(&mut self) -> StorefrontResult<&mut Self> {
        self.base.navigate("/")?;
        Ok(self)
    }
}
