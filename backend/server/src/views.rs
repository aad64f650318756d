//! Server-rendered pages for the admin side. Anything interpolated from a
//! registrant goes through [`escape`].
use crate::models::Registrant;

const STYLE: &str = "body{font-family:sans-serif;max-width:40rem;margin:3rem auto;padding:0 1rem}\
.card{border-radius:8px;padding:1.5rem}\
.unclaimed{border:3px solid #2e7d32}\
.claimed{border:3px solid #c62828;background:#fdecea}\
button{font-size:1.2rem;padding:.6rem 1.4rem}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn registrant_details(r: &Registrant) -> String {
    format!(
        "<h2>{name}</h2>\n<p>Cédula: {id}</p>\n<p>Correo: {email}</p>\n<p>Teléfono: {phone}</p>\n<p>Ciudad: {city}</p>",
        name = escape(&r.full_name()),
        id = r.government_id,
        email = escape(&r.email),
        phone = escape(&r.phone),
        city = escape(&r.city),
    )
}

pub fn claim_prompt(r: &Registrant) -> String {
    let body = format!(
        "<div class=\"card unclaimed\">\n{details}\n<p>Premio sin reclamar.</p>\n\
         <form method=\"post\" action=\"/claim/{identifier}\">\n\
         <button type=\"submit\">Entregar premio</button>\n</form>\n</div>",
        details = registrant_details(r),
        identifier = r.identifier,
    );

    page("Reclamar premio", &body)
}

pub fn already_claimed(r: &Registrant) -> String {
    let body = format!(
        "<div class=\"card claimed\">\n{details}\n<h1>YA RECLAMADO</h1>\n\
         <p>Este premio ya fue entregado.</p>\n</div>",
        details = registrant_details(r),
    );

    page("Premio reclamado", &body)
}

pub fn registered() -> String {
    page(
        "Registro exitoso",
        "<h1>Gracias por participar.</h1>\n<p>Si autorizaste el contacto, recibirás tu boleto por correo.</p>",
    )
}

pub fn login() -> String {
    page(
        "Ingreso",
        "<h1>Ingreso de administrador</h1>\n<form method=\"post\" action=\"/login\">\n\
         <p><label>Usuario <input name=\"username\" autocomplete=\"username\"></label></p>\n\
         <p><label>Contraseña <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label></p>\n\
         <button type=\"submit\">Entrar</button>\n</form>",
    )
}

pub fn unauthorized() -> String {
    page("No autorizado", "<h1>No autorizado</h1>\n<p><a href=\"/login\">Ingresar</a></p>")
}

pub fn not_found() -> String {
    page("No encontrado", "<h1>404</h1>\n<p>No encontrado.</p>")
}

pub fn error() -> String {
    page("Error", "<h1>Error</h1>\n<p>Algo salió mal. Intenta de nuevo.</p>")
}
