//! Live storefront scenarios in Chromium
//!
//! Run with `cargo test --features browser -- --ignored` against a deployed
//! storefront. `STOREFRONT_ENV` and `BASE_URL` pick the target.

#![cfg(feature = "browser")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use storefront::prelude::*;
use storefront::{launch, logging};

fn start() -> (SessionGuard<Box<dyn Session>>, Config) {
    logging::init();
    let config = Config::load().expect("configuration");
    let session = launch(&config).expect("chromium");
    (SessionGuard::new(session), config)
}

#[test]
#[ignore = "needs Chromium and a running storefront"]
fn test_valid_admin_login() {
    let (mut session, config) = start();
    let admin = config.credentials("admin_user").unwrap();
    let mut login = LoginPage::new(&mut **session, &config);
    login.open().unwrap().login_as(&admin).unwrap();
    assert!(login.is_logged_in().unwrap());
}

#[test]
#[ignore = "needs Chromium and a running storefront"]
fn test_invalid_login_shows_error() {
    let (mut session, config) = start();
    let mut login = LoginPage::new(&mut **session, &config);
    login
        .open()
        .unwrap()
        .login("invalid@example.com", "wrongpassword")
        .unwrap();
    let message = login.get_error_message().unwrap().unwrap_or_default();
    assert!(message.to_lowercase().contains("invalid"));
}

#[test]
#[ignore = "needs Chromium and a running storefront"]
fn test_add_to_cart_with_quantity() {
    let (mut session, config) = start();
    let mut product = ProductPage::new(&mut **session, &config);
    product.open_product("1").unwrap().set_quantity(2).unwrap().add_to_cart().unwrap();
    drop(product);

    let mut cart = CartPage::new(&mut **session, &config);
    cart.open().unwrap();
    assert!(cart.get_cart_items_count().unwrap() > 0);
    assert_eq!(cart.get_item_quantity(0).unwrap(), Some(2));
}

#[test]
#[ignore = "needs Chromium and a running storefront"]
fn test_search_without_results() {
    let (mut session, config) = start();
    let mut home = HomePage::new(&mut **session, &config);
    home.open().unwrap();
    let mut results = home.search("NonExistentProductXYZ123").unwrap();
    assert_eq!(results.get_results_count().unwrap(), 0);
    assert!(results.is_no_results_message_displayed(None));
}

#[test]
#[ignore = "needs Chromium and a running storefront"]
fn test_repeated_lookups_keep_element_ids() {
    let (mut session, config) = start();
    session.navigate(config.base_url()).unwrap();
    let links = Locator::css("a");
    let first = session.find_all(None, &links).unwrap();
    for _ in 0..20 {
        assert_eq!(session.find_all(None, &links).unwrap(), first);
    }
    let size = session
        .execute_script("return window.__sf.nodes.size;", &[])
        .unwrap();
    assert_eq!(size.as_u64(), Some(first.len() as u64));
}
