//! HTML email bodies.
//!
//! Every template shares one layout: a blue header with the logo and a
//! heading, a content block, and a small footer. Caller-supplied text is
//! HTML-escaped before it is interpolated.

const LOGO_URL: &str = "https://northfi.com.br/img/logoNorthPreto.png";
const ACCOUNT_URL: &str = "https://northfi.com.br";

const STYLE: &str = r#"
    body,table,td {font-family: Arial, Helvetica, sans-serif; margin:0; padding:0;}
    img {border:0; display:block;}
    a {color:#ffffff; text-decoration:none}

    .wrapper {width:100%; background:#f0f2f5; padding:30px 0;}
    .content {max-width:600px; background:#ffffff; margin:0 auto; border-radius:10px; overflow:hidden; box-shadow:0 4px 12px rgba(0,0,0,0.08)}

    .header {background:#1a73e8; padding:30px; text-align:center; color:#fff;}
    .header h1 {margin:0; font-size:24px;}
    .header img {max-width:200px; height:auto; margin:0 auto 20px auto; display:block; background:#ffffff; padding:10px; border-radius:8px;}

    .body {padding:30px; color:#333; line-height:1.6;}
    .body h2 {margin-top:0; color:#1a73e8;}

    .btn {display:inline-block; background:#1a73e8; padding:12px 20px; border-radius:6px; font-weight:bold; color:#ffffff !important; text-decoration:none !important;}
    .code {font-size:32px; letter-spacing:8px; font-weight:bold; color:#1a73e8; background:#f8f9fa; padding:16px 24px; border-radius:6px; display:inline-block;}

    .footer {background:#f7f7f7; padding:20px; font-size:12px; text-align:center; color:#666;}

    @media only screen and (max-width:480px) {
      .header h1 {font-size:20px;}
      .body h2 {font-size:18px;}
    }
"#;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Arguments are inserted as-is; callers escape them.
fn layout(title: &str, heading: &str, company: &str, content: &str, footer: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="pt-BR">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{title}</title>
  <style>{STYLE}  </style>
</head>
<body>
  <table role="presentation" class="wrapper" width="100%" cellspacing="0" cellpadding="0">
    <tr>
      <td align="center">
        <table role="presentation" class="content" width="100%" cellspacing="0" cellpadding="0">
          <tr>
            <td class="header">
              <img src="{LOGO_URL}" alt="{company}" style="max-width:200px; height:auto; margin-bottom:20px;">
              <h1>{heading}</h1>
            </td>
          </tr>
          <tr>
            <td class="body">
{content}
            </td>
          </tr>
          <tr>
            <td class="footer">
{footer}
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
    )
}

/// Regular email: the subject is the heading, the body keeps its line breaks.
pub fn default_email(subject: &str, body: &str, company: &str) -> String {
    let subject = escape_html(subject);
    let company = escape_html(company);
    let content = format!(
        r#"              <div style="white-space: pre-line;">{}</div>"#,
        escape_html(body)
    );
    let footer = format!("              <p>Você recebeu este e-mail de {company}.</p>");

    layout(&subject, &subject, &company, &content, &footer)
}

/// Welcome email for a newly registered user.
///
/// `message` is shown under the greeting; pass an empty string to omit it.
pub fn welcome_email(name: &str, message: &str, company: &str) -> String {
    let name = escape_html(name);
    let company = escape_html(company);
    let message = if message.trim().is_empty() {
        String::new()
    } else {
        format!(
            r#"              <div style="white-space: pre-line; margin-bottom:20px;">{}</div>
"#,
            escape_html(message)
        )
    };
    let content = format!(
        r#"              <h2>Olá, {name}! Estamos muito felizes em ter você conosco!</h2>
{message}              <p>Agora você faz parte da nossa comunidade e terá acesso a todas as vantagens que preparamos para você.</p>
              <p>Para começar, recomendamos:</p>
              <ul>
                <li>Completar seu perfil;</li>
                <li>Explorar os recursos principais;</li>
                <li>Ativar notificações para não perder nenhuma novidade.</li>
              </ul>
              <p style="margin:20px 0; text-align:center;">
                <a href="{ACCOUNT_URL}" target="_blank" class="btn">Acessar minha conta</a>
              </p>
              <p>Se precisar de ajuda, nossa equipe está à disposição. Basta responder este e-mail ou acessar nossa central de suporte.</p>"#
    );
    let footer = format!("              <p>Você recebeu este e-mail porque se cadastrou em {company}.</p>");

    layout(
        "Bem-vindo",
        &format!("Bem-vindo(a) à {company}"),
        &company,
        &content,
        &footer,
    )
}

fn verification_footer(company: &str) -> String {
    format!(
        "              <p>Se você não se cadastrou na {company}, ignore este email.</p>\n              <p>Este email foi enviado automaticamente, não responda.</p>"
    )
}

/// Verification email with a confirmation button and a copyable link.
pub fn verification_link_email(username: &str, company: &str, verify_url: &str) -> String {
    let username = escape_html(username);
    let company = escape_html(company);
    let url = escape_html(verify_url);
    let content = format!(
        r#"              <h2>Olá, {username}!</h2>
              <p>Para completar seu cadastro na {company}, precisamos verificar seu endereço de email.</p>
              <p>Clique no botão abaixo para confirmar seu email:</p>
              <p style="margin:30px 0; text-align:center;">
                <a href="{url}" target="_blank" class="btn">Verificar meu email</a>
              </p>
              <p>Se você não conseguir clicar no botão, copie e cole o link abaixo no seu navegador:</p>
              <p style="word-break: break-all; color: #666; background: #f8f9fa; padding: 10px; border-radius: 4px; font-family: monospace;">{url}</p>
              <p><strong>Este link expira em 24 horas.</strong></p>"#
    );

    layout(
        "Verificação de Email",
        "Verificar Email",
        &company,
        &content,
        &verification_footer(&company),
    )
}

/// Verification email that shows a code to type into the app.
pub fn verification_code_email(username: &str, company: &str, code: &str) -> String {
    let username = escape_html(username);
    let company = escape_html(company);
    let code = escape_html(code);
    let content = format!(
        r#"              <h2>Olá, {username}!</h2>
              <p>Para completar seu cadastro na {company}, precisamos verificar seu endereço de email.</p>
              <p>Use o código abaixo para confirmar seu email:</p>
              <p style="margin:30px 0; text-align:center;">
                <span class="code">{code}</span>
              </p>
              <p><strong>Este código expira em 24 horas.</strong></p>"#
    );

    layout(
        "Código de Verificação",
        "Código de Verificação",
        &company,
        &content,
        &verification_footer(&company),
    )
}
