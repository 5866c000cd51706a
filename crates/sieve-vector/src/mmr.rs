//! Maximal Marginal Relevance re-ranking.
//!
//! Greedy: each step picks the candidate maximizing
//! `lambda * sim(query, c) - (1 - lambda) * max(sim(c, s) for s in selected)`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrParams {
    /// Candidates fetched by plain similarity before re-ranking.
    pub fetch_k: usize,
    /// 1.0 is pure relevance, 0.0 is pure diversity.
    pub lambda: f32,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self { fetch_k: 20, lambda: 0.5 }
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Indices into `candidates`, in selection order, at most `k` long.
pub fn mmr_select(query: &[f32], candidates: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let relevance: Vec<f32> = candidates.iter().map(|c| cosine(query, c)).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &i) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine(&candidates[i], &candidates[s]))
                .fold(0.0f32, f32::max);
            let score = lambda * relevance[i] - (1.0 - lambda) * redundancy;
            // strict comparison keeps the earlier (more relevant) candidate on ties
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }
    selected
}
