use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use log::debug;

use super::Verifier;

pub async fn authorize(
    verifier: State<Verifier>,
    mut req: Request,
    next: Next,
) -> crate::Result<Response> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(super::Error::Unauthorized)?;

    let auth_user = verifier.verify(bearer.token())?;
    debug!("authorized {:?}", auth_user.id());

    req.extensions_mut().insert(auth_user);

    Ok(next.run(req).await)
}
