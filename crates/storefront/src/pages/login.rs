//! Sign-in form.

use crate::config::Credentials;
use crate::locator::Locator;
use crate::page::BasePage;
use crate::result::StorefrontResult;

/// Login page at `/login`
#[derive(Debug)]
pub struct LoginPage<'s> {
    base: BasePage<'s>,
}

page_object!(LoginPage, "/login");

impl LoginPage<'_> {
    pub const EMAIL_INPUT: Locator = Locator::id("email");
    pub const PASSWORD_INPUT: Locator = Locator::id("password");
    pub const LOGIN_BUTTON: Locator = Locator::css("button[type='submit']");
    pub const FORGOT_PASSWORD_LINK: Locator = Locator::link_text("Forgot Password?");
    pub const REGISTER_LINK: Locator = Locator::link_text("Register");
    pub const ERROR_MESSAGE: Locator = Locator::css(".alert-danger");
    pub const SUCCESS_MESSAGE: Locator = Locator::css(".alert-success");

    /// Open the login page
    pub fn open(&mut self) -> StorefrontResult<&mut Self> {
        self.base.navigate("/login")?;
        Ok(self)
    }

    /// Fill in both fields and submit
    pub fn login(&mut self, email: &str, password: &str) -> StorefrontResult<&mut Self> {
        self.type_text(&Self::EMAIL_INPUT, email, None)?;
        self.type_text(&Self::PASSWORD_INPUT, password, None)?;
        self.click(&Self::LOGIN_BUTTON, None)?;
        Ok(self)
    }

    /// [`login`](Self::login) with a configured account
    pub fn login_as(&mut self, credentials: &Credentials) -> StorefrontResult<&mut Self> {
        self.login(&credentials.username, &credentials.password)
    }

    pub fn click_forgot_password(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::FORGOT_PASSWORD_LINK, None)?;
        Ok(self)
    }

    pub fn click_register(&mut self) -> StorefrontResult<&mut Self> {
        self.click(&Self::REGISTER_LINK, None)?;
        Ok(self)
    }

    /// Text of the error banner, if one becomes visible
    pub fn get_error_message(&mut self) -> StorefrontResult<Option<String>> {
        self.visible_text(&Self::ERROR_MESSAGE)
    }

    /// Text of the success banner, if one becomes visible
    pub fn get_success_message(&mut self) -> StorefrontResult<Option<String>> {
        self.visible_text(&Self::SUCCESS_MESSAGE)
    }

    fn visible_text(&mut self, locator: &Locator) -> StorefrontResult<Option<String>> {
        if self.is_visible(locator, None) {
            self.read_text(locator, None).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Whether the browser left the form for an account area.
    ///
    /// Only the URL shape is checked.
    pub fn is_logged_in(&self) -> StorefrontResult<bool> {
        let url = self.current_url()?;
        Ok(url.contains("/account") || url.contains("/dashboard"))
    }
}
