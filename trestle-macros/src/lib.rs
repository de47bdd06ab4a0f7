//! Procedural macros for the Trestle runtime.
//!
//! - `#[trestle::main]` and `#[trestle::test]` build a runtime and run the
//!   async body on its first execution context,
//! - `select!` races futures and runs the handler of the first one to finish.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Races futures and evaluates the handler of the first one to complete.
///
/// ```rust,ignore
/// let outcome = trestle::select! {
///     channel.receive() => |value| Some(value),
///     trestle::time::sleep(Duration::from_millis(50)) => |_| None,
/// };
/// ```
///
/// The losing futures are dropped, which cancels their pending suspensions.
#[proc_macro]
pub fn select(input: TokenStream) -> TokenStream {
    let branches = match utils::parse_select_branches(input) {
        Ok(branches) => branches,
        Err(message) => return compile_error(&message),
    };
    let count = branches.len();

    if count == 0 {
        return "()".parse().unwrap_or_default();
    }

    let mut out = String::new();
    out.push_str("{\n");

    let generics = (1..=count)
        .map(|i| format!("__T{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!("enum __SelectResult<{generics}> {{\n"));
    for i in 1..=count {
        out.push_str(&format!("    __F{i}(__T{i}),\n"));
    }
    out.push_str("}\n\n");

    for (i, (future, _handler)) in branches.iter().enumerate() {
        let idx = i + 1;
        out.push_str(&format!(
            "let mut __f{idx} = ::std::boxed::Box::pin({future});\n"
        ));
    }

    out.push_str("\nlet __res = ::std::future::poll_fn(move |cx| {\n");
    out.push_str("    use ::std::task::Poll;\n");
    out.push_str("    use ::std::future::Future;\n");

    for i in 1..=count {
        out.push_str(&format!(
            "    if let Poll::Ready(val) = __f{i}.as_mut().poll(cx) {{\n\
                 return Poll::Ready(__SelectResult::__F{i}(val));\n\
             }}\n"
        ));
    }

    out.push_str("    Poll::Pending\n");
    out.push_str("}).await;\n\n");

    out.push_str("match __res {\n");
    for (i, (_future, handler)) in branches.iter().enumerate() {
        let idx = i + 1;
        out.push_str(&format!(
            "    __SelectResult::__F{idx}(val) => {{ ({handler})(val) }},\n"
        ));
    }
    out.push_str("}\n");
    out.push_str("}\n");

    out.parse()
        .unwrap_or_else(|err| compile_error(&format!("select macro error: {err}")))
}

/// Runs an async `main` on a freshly built runtime.
///
/// Accepts `contexts = N` and `channel_capacity = N`.
///
/// ```rust,ignore
/// #[trestle::main(contexts = 2)]
/// async fn main() {
///     // runs on the first execution context
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = match runtime_builder(attr) {
        Ok(builder) => builder,
        Err(message) => return compile_error(&message),
    };

    let Some((tokens, pos, block)) = take_async_body(item) else {
        return compile_error("#[trestle::main] expects an async function");
    };

    let new_block = format!(
        "{{
            let runtime = {builder};
            runtime
                .block_on(async move {{
                    {block}
                }})
        }}"
    );

    replace_body(tokens, pos, &new_block)
}

/// Turns an async function into a test running on a fresh runtime.
///
/// Accepts the same options as `#[trestle::main]`.
///
/// ```rust,ignore
/// #[trestle::test(contexts = 2)]
/// async fn resumes_on_origin() {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = match runtime_builder(attr) {
        Ok(builder) => builder,
        Err(message) => return compile_error(&message),
    };

    let Some((tokens, pos, block)) = take_async_body(item) else {
        return compile_error("#[trestle::test] expects an async function");
    };

    let new_block = format!(
        "{{
        let runtime = {builder};
        runtime
            .block_on(async move {{ {block} }});
    }}"
    );

    let mut result: Vec<TokenTree> = "#[test]"
        .parse::<TokenStream>()
        .unwrap_or_default()
        .into_iter()
        .collect();

    result.extend(replace_body(tokens, pos, &new_block));
    result.into_iter().collect()
}

/// Builds the `RuntimeBuilder` expression from the attribute arguments.
fn runtime_builder(attr: TokenStream) -> Result<String, String> {
    let mut builder = String::from("::trestle::RuntimeBuilder::new()");

    for arg in utils::split_args(attr) {
        let arg = utils::tokens_to_string(&arg);
        let Some((key, value)) = arg.split_once('=') else {
            return Err(format!("expected `key = value`, found `{arg}`"));
        };

        let key = key.trim();
        let value = value.trim();

        let Ok(n) = value.parse::<usize>() else {
            return Err(format!("`{key}` expects an integer, found `{value}`"));
        };

        match key {
            "contexts" | "channel_capacity" => builder.push_str(&format!(".{key}({n})")),
            _ => return Err(format!("unknown runtime option `{key}`")),
        }
    }

    builder.push_str(".build()");
    Ok(builder)
}

/// Removes the `async` keyword and extracts the function body.
///
/// Returns the remaining tokens, the position of the body and its source.
fn take_async_body(item: TokenStream) -> Option<(Vec<TokenTree>, usize, String)> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let async_pos = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))?;
    tokens.remove(async_pos);

    let pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))?;

    let TokenTree::Group(group) = &tokens[pos] else {
        return None;
    };
    let block = group.stream().to_string();

    Some((tokens, pos, block))
}

fn replace_body(mut tokens: Vec<TokenTree>, pos: usize, body: &str) -> TokenStream {
    let stream = match body.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => return compile_error(&format!("failed to expand body: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));
    tokens.into_iter().collect()
}

fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
