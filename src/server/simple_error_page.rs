use enums::Status;
use server::Response;

const PART1: &'static str = "\
    <!DOCTYPE html>\
    <html>\
        <head>\
            <title>\
    ";
const PART2: &'static str = "\
            </title>\
        </head>\
        <body>\
            <h1>\
    ";
const PART3: &'static str = concat!("\
            </h1>\
            <hr>\
            <p>Yours faithfully,<br>\
                tk-h1/", env!("CARGO_PKG_VERSION"), "\
            </p>\
        </body>\
    </html>\
    ");

/// Generates response with the default error page
///
/// This is the default for `Config::error_page`. The connection is always
/// closed after an error page, so the function only builds the response.
pub fn simple_error_page(status: Status) -> Response {
    let body = format!("{p1}{code:03} {status}{p2}{code:03} {status}{p3}",
        code=status.code(), status=status.reason(),
        p1=PART1, p2=PART2, p3=PART3);
    Response::new(status)
        .with_header("Content-Type", "text/html")
        .with_body(body)
}

#[cfg(test)]
mod test {
    use enums::Status;
    use super::simple_error_page;

    #[test]
    fn page() {
        let resp = simple_error_page(Status::RequestHeaderFieldsTooLarge);
        assert_eq!(resp.status().code(), 431);
        assert_eq!(resp.headers().get("Content-Type"), Some("text/html"));
        let len = resp.body().length().unwrap() as usize;
        assert!(len > 2 * "431 Request Header Fields Too Large".len());
    }
}
