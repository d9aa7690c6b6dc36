// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_markdown_content(size: usize) -> String {
    let base = "# Title\n\n## Section\n\nParagraph with *some* content and a [link](https://example.com).\n\n- Bullet point\n  - Nested item\n- Another item\n\n```rust\nfn example() {\n    println!(\"Hello\");\n}\n```\n\n| Key | Value |\n| --- | ----- |\n| a | 1 |\n\n";
    base.repeat(size)
}

/// Frontmatter blocks the extractor treats differently: list tags, a
/// comma string of tags, a slug override, and a line that is not YAML.
const FRONTMATTER: [&str; 4] = [
    "---\ntitle: Bench\ntags: [bench, perf]\n---\n\n",
    "---\ntitle: Bench\ntags: \"bench, perf, deep\"\n---\n\n",
    "---\nslug: bench-override\ndraft: true\n---\n\n",
    "---\ntitle: Bench\nthis line is not yaml\n---\n\n",
];

/// A document of `chains` heading chains, each `depth` headings long. Levels
/// climb one per heading and stay at 6 once there, so chains deeper than the
/// nesting limit exercise heading demotion. `variant` picks the frontmatter.
#[allow(dead_code)]
pub fn generate_heading_chains(chains: usize, depth: usize, variant: usize) -> String {
    let mut doc = String::from(FRONTMATTER[variant % FRONTMATTER.len()]);

    for chain in 0..chains {
        for step in 0..depth {
            let level = (step + 1).min(6);
            doc.push_str(&format!("{} Chain {chain} step {step}\n\n", "#".repeat(level)));
            doc.push_str(&chain_body(chain, step));
        }
    }

    doc
}

/// Block content under one heading, rotating through the block kinds the
/// exporter renders.
#[allow(dead_code)]
fn chain_body(chain: usize, step: usize) -> String {
    match (chain + step) % 4 {
        0 => format!("Plain words with `code {step}` and *emphasis* in chain {chain}.\n\n"),
        1 => format!("1. first\n2. second\n   - [x] nested task {step}\n   - [ ] open task\n\n"),
        2 => format!("| step | value |\n| --- | ---: |\n| {step} | `a\\|b` |\n\n"),
        _ => format!("```toml\nchain = {chain}\nstep = {step}\n```\n\n"),
    }
}
