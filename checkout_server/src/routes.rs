//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here awaits the checkout API, which only ever awaits
//! the database, so workers stay free to serve other buyers while a checkout is in flight.
use actix_web::{get, web, HttpResponse, Responder};
use checkout_engine::{db_types::OrderId, CheckoutDatabase, CheckoutFlowApi, CheckoutRequest};
use log::*;

use crate::{
    data_objects::{CancelRequest, OrderQuery, OrderView, PaymentConfirmation},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(create_checkout => Post "/checkout" impl CheckoutDatabase);
/// Route handler for creating a checkout.
///
/// The body is a [`CheckoutRequest`]. On success the buyer's tickets are held and a `201 Created` response carries the
/// order id, the price breakdown and the time by which payment must be confirmed.
///
/// If any unit cannot be supplied in full, nothing is held and the `409` response lists the shortfall for every unit
/// that ran out.
pub async fn create_checkout<B: CheckoutDatabase>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST checkout for event {} ({} line(s))", request.event_id, request.lines().count());
    let result = api.create_checkout(request).await?;
    info!("💻️ Checkout created. Order {} holds its tickets until {}", result.order_id, result.expires_at);
    Ok(HttpResponse::Created().json(result))
}

route!(checkout_status => Get "/checkout" impl CheckoutDatabase);
/// Route handler for fetching an order by id, passed as the `order_id` query parameter.
///
/// A pending order whose hold has elapsed is expired before it is returned.
pub async fn checkout_status<B: CheckoutDatabase>(
    query: web::Query<OrderQuery>,
    api: web::Data<CheckoutFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let OrderQuery { order_id } = query.into_inner();
    debug!("💻️ GET checkout status for {order_id}");
    let order = api.order_status(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderView::from(order)))
}

route!(cancel_checkout => Post "/checkout/{order_id}/cancel" impl CheckoutDatabase);
/// Route handler for cancelling a pending order. The body is optional and may carry a `reason` for the audit trail.
pub async fn cancel_checkout<B: CheckoutDatabase>(
    path: web::Path<OrderId>,
    body: Option<web::Json<CancelRequest>>,
    api: web::Data<CheckoutFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let CancelRequest { reason } = body.map(|b| b.into_inner()).unwrap_or_default();
    debug!("💻️ POST cancel for {order_id}");
    let order = api.cancel(&order_id, reason.as_deref()).await?;
    Ok(HttpResponse::Ok().json(OrderView::from(order)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(payment_confirmed => Post "/payment_confirmed" impl CheckoutDatabase);
/// Route handler for the payment provider's confirmation webhook.
///
/// This route must be wrapped in the HMAC middleware. Confirming the same payment twice is harmless: the second call
/// returns the completed order unchanged.
pub async fn payment_confirmed<B: CheckoutDatabase>(
    body: web::Json<PaymentConfirmation>,
    api: web::Data<CheckoutFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let PaymentConfirmation { order_id, payment_reference } = body.into_inner();
    info!("💻️ Payment {payment_reference} confirmed for order {order_id}");
    let order = api.complete(&order_id).await.map_err(|e| {
        warn!("💻️ Payment {payment_reference} could not be applied to order {order_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(OrderView::from(order)))
}
