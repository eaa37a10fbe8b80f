use crate::Idx2d;

/// 矩形区域的行优先索引迭代器.
///
/// 迭代左上角为 `origin`、大小为 `(h, w)` 的区域内所有 **绝对** 索引.
/// 相比 `flat_map` 组合出的迭代器, 手写结构体更小, 也能被直接存储和复制.
#[derive(Debug, Clone)]
pub struct RectIter {
    origin: Idx2d,
    cur_h: usize,
    cur_w: usize,
    h: usize,
    w: usize,
}

impl RectIter {
    /// 初始化.
    #[inline]
    pub fn new(origin: Idx2d, (h, w): Idx2d) -> Self {
        Self {
            origin,
            cur_h: 0,
            cur_w: 0,
            h,
            w,
        }
    }

    /// 以 `center` 为中心、半径为 `radius` 的方形邻域与 `(0, 0)..shape` 的交集.
    pub fn around(center: Idx2d, radius: usize, shape: Idx2d) -> Self {
        let top = center.0.saturating_sub(radius);
        let left = center.1.saturating_sub(radius);
        let bottom = center.0.saturating_add(radius + 1).min(shape.0);
        let right = center.1.saturating_add(radius + 1).min(shape.1);
        Self::new(
            (top, left),
            (bottom.saturating_sub(top), right.saturating_sub(left)),
        )
    }

    /// 区域内索引总数 (与迭代进度无关).
    #[inline]
    pub fn area(&self) -> usize {
        self.h * self.w
    }
}

impl Iterator for RectIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        if self.h == 0 || self.w == 0 || self.cur_h == self.h {
            return None;
        }
        let ret_pos = (self.origin.0 + self.cur_h, self.origin.1 + self.cur_w);
        if self.cur_w + 1 == self.w {
            self.cur_w = 0;
            self.cur_h += 1;
        } else {
            self.cur_w += 1;
        }
        Some(ret_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::RectIter;
    use crate::Idx2d;

    fn rect_builtin((t, l): Idx2d, (h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
        (t..t + h).flat_map(move |first| (l..l + w).map(move |second| (first, second)))
    }

    #[test]
    fn test_rect_iter() {
        for i in 0..=3 {
            for j in 0..=3 {
                for origin in [(0, 0), (2, 5)] {
                    assert!(Iterator::eq(
                        rect_builtin(origin, (i, j)),
                        RectIter::new(origin, (i, j))
                    ));
                }
            }
        }
    }

    #[test]
    fn test_around_clips_to_shape() {
        let it = RectIter::around((0, 1), 2, (10, 4));
        assert_eq!(it.area(), 3 * 4);
        assert_eq!(it.clone().next(), Some((0, 0)));
        assert_eq!(it.last(), Some((2, 3)));

        let inner = RectIter::around((5, 5), 1, (10, 10));
        assert_eq!(inner.count(), 9);
    }
}
