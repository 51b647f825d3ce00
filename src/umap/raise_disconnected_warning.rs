use tracing::debug;
use tracing::warn;

/// Report the effect of `disconnection_distance` on the fuzzy graph.
///
/// Silent when nothing was removed, `debug!` when edges were removed but every
/// vertex kept an edge, and `warn!` once any vertex lost all of its edges,
/// louder when more than `threshold` of the rows are affected.
pub fn raise_disconnected_warning(
  edges_removed: usize,
  vertices_disconnected: usize,
  disconnection_distance: f32,
  total_rows: usize,
  threshold: f64,
) {
  let limit = (threshold * total_rows as f64) as usize;
  if vertices_disconnected == 0 {
    if edges_removed > 0 {
      debug!(
        edges_removed,
        disconnection_distance, "distant edges removed, no vertex disconnected"
      );
    }
  } else if vertices_disconnected <= limit {
    warn!(
      edges_removed,
      vertices_disconnected,
      disconnection_distance,
      "a few vertices were disconnected from the manifold; they keep their initial coordinates"
    );
  } else {
    warn!(
      edges_removed,
      vertices_disconnected,
      disconnection_distance,
      total_rows,
      "a large share of vertices were disconnected from the manifold; consider removing outliers or raising disconnection_distance"
    );
  }
}
