//! 二维 k-d 树, 用于候选峰的邻域查询.

use super::Coordinate;
use ordered_float::OrderedFloat;

/// 二维 k-d 树.
///
/// 建树一次, 多次查询. 只保存点的下标, 点本身从外部切片借用.
#[derive(Debug)]
pub struct KdTree<'a> {
    points: &'a [Coordinate],
    nodes: Vec<KdNode>,
}

#[derive(Debug, Clone)]
struct KdNode {
    /// 点在 `points` 中的下标.
    index: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// 分割维度, 0 为 x, 1 为 y.
    axis: u8,
}

#[inline]
fn along(c: &Coordinate, axis: u8) -> f64 {
    match axis {
        0 => c.x,
        _ => c.y,
    }
}

impl<'a> KdTree<'a> {
    /// 以中位数分割建树. `points` 可以为空.
    pub fn build(points: &'a [Coordinate]) -> Self {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        Self::build_recursive(points, &mut indices, 0, &mut nodes);
        Self { points, nodes }
    }

    fn build_recursive(
        points: &[Coordinate],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let axis = (depth % 2) as u8;
        let median = indices.len() / 2;
        indices.select_nth_unstable_by_key(median, |&i| OrderedFloat(along(&points[i], axis)));

        let node_idx = nodes.len();
        nodes.push(KdNode {
            index: indices[median],
            left: None,
            right: None,
            axis,
        });

        let (left, right) = indices.split_at_mut(median);
        nodes[node_idx].left = Self::build_recursive(points, left, depth + 1, nodes);
        nodes[node_idx].right = Self::build_recursive(points, &mut right[1..], depth + 1, nodes);
        Some(node_idx)
    }

    /// 点的个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 树是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 查找与 `query` 的距离 **严格小于** `radius` 的所有点下标, 按下标升序返回.
    pub fn within(&self, query: Coordinate, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        if self.nodes.is_empty() || radius.is_nan() || radius <= 0.0 {
            return found;
        }
        let r2 = radius * radius;
        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            let p = &self.points[node.index];
            let (dx, dy) = (p.x - query.x, p.y - query.y);
            if dx * dx + dy * dy < r2 {
                found.push(node.index);
            }
            let diff = along(&query, node.axis) - along(p, node.axis);
            let (near, far) = match diff < 0.0 {
                true => (node.left, node.right),
                false => (node.right, node.left),
            };
            stack.extend(near);
            if diff * diff < r2 {
                stack.extend(far);
            }
        }
        found.sort_unstable();
        found
    }
}
