mod hmac;

pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, PAYMENT_HMAC_HEADER};
