use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` at its top-level commas.
///
/// Groups are single token trees, so commas nested in parentheses, brackets
/// or braces never split an argument. Empty arguments (a trailing comma)
/// are skipped.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = vec![Vec::new()];

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => args.push(Vec::new()),
            _ => {
                if let Some(current) = args.last_mut() {
                    current.push(token);
                }
            }
        }
    }

    args.retain(|arg| !arg.is_empty());
    args
}

/// Converts tokens back into source text.
///
/// A space is kept between consecutive identifiers and literals so that
/// `move |x|` does not collapse into `move|x|` and `foo bar` into `foobar`.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_word = false;

    for token in tokens {
        let is_word = matches!(token, TokenTree::Ident(_) | TokenTree::Literal(_));

        if prev_was_word && is_word {
            out.push(' ');
        }

        out.push_str(&token.to_string());
        prev_was_word = is_word;
    }

    out
}

fn is_punct(token: Option<&TokenTree>, ch: char) -> bool {
    matches!(token, Some(TokenTree::Punct(p)) if p.as_char() == ch)
}

/// Splits `select!` input into branches.
///
/// Unlike [`split_args`], commas inside turbofish generic arguments
/// (`foo::<A, B>()`) do not end a branch. A `<` opens generic arguments only
/// right after `::`, so comparisons keep splitting normally.
fn split_branches(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut branches = vec![Vec::new()];
    let mut depth = 0usize;

    for token in input {
        let Some(current) = branches.last_mut() else {
            break;
        };

        if let TokenTree::Punct(p) = &token {
            match p.as_char() {
                ',' if depth == 0 => {
                    branches.push(Vec::new());
                    continue;
                }
                '<' => {
                    let n = current.len();
                    let turbofish = n >= 2
                        && is_punct(current.get(n - 2), ':')
                        && is_punct(current.get(n - 1), ':');

                    if depth > 0 || turbofish {
                        depth += 1;
                    }
                }
                '>' if depth > 0 && !is_punct(current.last(), '-') => depth -= 1,
                _ => {}
            }
        }

        current.push(token);
    }

    branches.retain(|branch| !branch.is_empty());
    branches
}

/// Parses `future => handler` branches separated by commas.
///
/// Returns `(future, handler)` source pairs, or an error naming the first
/// branch without an arrow or with an empty side.
pub(crate) fn parse_select_branches(input: TokenStream) -> Result<Vec<(String, String)>, String> {
    split_branches(input)
        .into_iter()
        .map(|tokens| {
            let arrow = tokens.windows(2).position(|pair| {
                matches!(
                    pair,
                    [TokenTree::Punct(eq), TokenTree::Punct(gt)]
                        if eq.as_char() == '=' && gt.as_char() == '>'
                )
            });

            let Some(arrow) = arrow else {
                return Err(format!(
                    "select! branch `{}` is missing `=> handler`",
                    tokens_to_string(&tokens)
                ));
            };

            let future = tokens_to_string(&tokens[..arrow]);
            let handler = tokens_to_string(&tokens[arrow + 2..]);

            if future.trim().is_empty() || handler.trim().is_empty() {
                return Err(format!(
                    "select! branch `{}` needs both a future and a handler",
                    tokens_to_string(&tokens)
                ));
            }

            Ok((future, handler))
        })
        .collect()
}
