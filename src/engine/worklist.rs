use smallvec::SmallVec;

use crate::engine::resume::ResumeBuffer;
use crate::engine::EngineError;
use crate::util::FrameBuffer;

/// Most rectangles the scheduler tracks at once.
pub const MAX_CALC_WORK: usize = 12;

/// One pending rectangle of the image. `begin` marks where within the
/// rectangle an interrupted scan left off; a fresh rectangle has
/// `begin == start`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkItem {
    pub x_start: i32,
    pub x_stop: i32,
    pub x_begin: i32,
    pub y_start: i32,
    pub y_stop: i32,
    pub y_begin: i32,
    pub pass: i32,
    pub sym: i32,
}

impl WorkItem {
    pub fn fresh(x_start: i32, x_stop: i32, y_start: i32, y_stop: i32) -> WorkItem {
        WorkItem {
            x_start,
            x_stop,
            x_begin: x_start,
            y_start,
            y_stop,
            y_begin: y_start,
            pass: 0,
            sym: 0,
        }
    }
}

/// Bounded list of pending rectangles, kept merged and sorted so passes
/// complete over the whole region in non-decreasing order.
#[derive(Default)]
pub struct WorkList {
    items: SmallVec<[WorkItem; MAX_CALC_WORK]>,
}

impl WorkList {
    pub fn new() -> WorkList {
        WorkList {
            items: SmallVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Append a rectangle. A full list drops the item and reports it; the
    /// caller degrades (evaluates immediately or triggers a recalc).
    pub fn add(&mut self, item: WorkItem) -> Result<(), EngineError> {
        if self.items.len() >= MAX_CALC_WORK {
            return Err(EngineError::WorkListFull);
        }
        self.items.push(item);
        self.tidy();
        Ok(())
    }

    /// Pop the first (lowest pass, topmost, leftmost) rectangle.
    pub fn take_first(&mut self) -> Option<WorkItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn lowest_pass(&self) -> Option<i32> {
        self.items.iter().map(|w| w.pass).min()
    }

    /// Combine mergeable entries, then re-sort.
    pub fn tidy(&mut self) {
        while let Some(gone) = self.combine_once() {
            self.items.remove(gone);
        }
        self.items
            .sort_by_key(|w| (w.pass, w.y_start, w.x_start));
    }

    /// Find two entries which can freely merge: same pass and symmetry, both
    /// unstarted (begin == start), three bounds shared and adjacency on the
    /// fourth. Merges into the first, returns the index to delete.
    fn combine_once(&mut self) -> Option<usize> {
        for i in 0..self.items.len() {
            if self.items[i].y_start != self.items[i].y_begin {
                continue;
            }
            for j in i + 1..self.items.len() {
                let (a, b) = (self.items[i], self.items[j]);
                if b.sym != a.sym
                    || b.y_start != b.y_begin
                    || b.x_start != b.x_begin
                    || a.pass != b.pass
                {
                    continue;
                }
                if a.x_start == b.x_start && a.x_begin == b.x_begin && a.x_stop == b.x_stop {
                    // vertical merge
                    if a.y_stop + 1 == b.y_start {
                        self.items[i].y_stop = b.y_stop;
                        return Some(j);
                    }
                    if b.y_stop + 1 == a.y_start {
                        self.items[i].y_start = b.y_start;
                        self.items[i].y_begin = b.y_begin;
                        return Some(j);
                    }
                }
                if a.y_start == b.y_start && a.y_begin == b.y_begin && a.y_stop == b.y_stop {
                    // horizontal merge
                    if a.x_stop + 1 == b.x_start {
                        self.items[i].x_stop = b.x_stop;
                        return Some(j);
                    }
                    if b.x_stop + 1 == a.x_start {
                        self.items[i].x_start = b.x_start;
                        self.items[i].x_begin = b.x_begin;
                        return Some(j);
                    }
                }
            }
        }
        None
    }

    /// Shift every rectangle by the pan offset.
    pub fn offset_all(&mut self, row: i32, col: i32) {
        for w in self.items.iter_mut() {
            w.y_start -= row;
            w.y_stop -= row;
            w.y_begin -= row;
            w.x_start -= col;
            w.x_stop -= col;
            w.x_begin -= col;
        }
    }

    /// Fix out of bounds and symmetry related damage after a pan: delete
    /// rectangles fully offscreen, clip the rest, split symmetry-dependent
    /// rectangles whose mirror half the shift invalidated (the no longer
    /// mirrored part restarts from scratch: span zeroed, pass and symmetry
    /// reset), and clamp begins back inside. Ends with a tidy.
    pub fn fix(&mut self, fb: &mut dyn FrameBuffer, x_dots: i32, y_dots: i32) {
        let mut i = 0;
        while i < self.items.len() {
            let w = self.items[i];
            if w.y_start >= y_dots || w.y_stop < 0 || w.x_start >= x_dots || w.x_stop < 0 {
                self.items.remove(i);
                continue;
            }
            if w.y_start < 0 {
                // partly off top edge
                if self.items[i].sym & 1 == 0 {
                    self.items[i].y_start = 0;
                    self.items[i].x_begin = 0;
                } else {
                    // x-axis symmetry: keep the still-mirrored part separate
                    let j = w.y_stop + w.y_start;
                    if j > 0 && self.items.len() < MAX_CALC_WORK {
                        let mut split = self.items[i];
                        split.y_start = 0;
                        split.y_stop = j;
                        self.items.push(split);
                        self.items[i].y_start = j + 1;
                    } else {
                        self.items[i].y_start = 0;
                    }
                    self.restart_item(i, fb, x_dots, y_dots);
                }
            }
            if self.items[i].y_stop >= y_dots {
                // partly off bottom edge
                let w = self.items[i];
                let mut j = y_dots - 1;
                if w.sym & 1 != 0 {
                    let k = w.y_start + (w.y_stop - j);
                    if k < j {
                        if self.items.len() >= MAX_CALC_WORK {
                            self.restart_item(i, fb, x_dots, y_dots);
                        } else {
                            let mut split = self.items[i];
                            split.y_start = k;
                            split.y_stop = j;
                            self.items.push(split);
                            j = k - 1;
                        }
                    }
                    self.items[i].sym &= !1;
                }
                self.items[i].y_stop = j;
            }
            if self.items[i].x_start < 0 {
                // partly off left edge
                let w = self.items[i];
                if w.sym & 2 == 0 {
                    self.items[i].x_start = 0;
                } else {
                    let j = w.x_stop + w.x_start;
                    if j > 0 && self.items.len() < MAX_CALC_WORK {
                        let mut split = self.items[i];
                        split.x_start = 0;
                        split.x_stop = j;
                        self.items.push(split);
                        self.items[i].x_start = j + 1;
                    } else {
                        self.items[i].x_start = 0;
                    }
                    self.restart_item(i, fb, x_dots, y_dots);
                }
            }
            if self.items[i].x_stop >= x_dots {
                // partly off right edge
                let w = self.items[i];
                let mut j = x_dots - 1;
                if w.sym & 2 != 0 {
                    let k = w.x_start + (w.x_stop - j);
                    if k < j {
                        if self.items.len() >= MAX_CALC_WORK {
                            self.restart_item(i, fb, x_dots, y_dots);
                        } else {
                            let mut split = self.items[i];
                            split.x_start = k;
                            split.x_stop = j;
                            self.items.push(split);
                            j = k - 1;
                        }
                    }
                    self.items[i].sym &= !2;
                }
                self.items[i].x_stop = j;
            }
            let w = &mut self.items[i];
            w.y_begin = w.y_begin.clamp(w.y_start, w.y_stop);
            w.x_begin = w.x_begin.clamp(w.x_start, w.x_stop);
            i += 1;
        }
        self.tidy();
    }

    /// Force a rectangle to restart: zero its pixels, reset pass, symmetry
    /// and begins.
    fn restart_item(&mut self, i: usize, fb: &mut dyn FrameBuffer, x_dots: i32, y_dots: i32) {
        let w = &mut self.items[i];
        let y_from = w.y_start.max(0);
        let y_to = w.y_stop.min(y_dots - 1);
        let x_from = w.x_start.max(0);
        let x_to = w.x_stop.min(x_dots - 1);
        if x_from <= x_to {
            let zeros = vec![0; (x_to - x_from + 1) as usize];
            for y in y_from..=y_to {
                fb.write_span(y as usize, x_from as usize, &zeros);
            }
        }
        w.sym = 0;
        w.pass = 0;
        w.y_begin = w.y_start;
        w.x_begin = w.x_start;
    }

    pub fn write_resume(&self, buf: &mut ResumeBuffer) {
        buf.put_i32(self.items.len() as i32);
        for w in self.items.iter() {
            buf.put_i32(w.x_start);
            buf.put_i32(w.x_stop);
            buf.put_i32(w.x_begin);
            buf.put_i32(w.y_start);
            buf.put_i32(w.y_stop);
            buf.put_i32(w.y_begin);
            buf.put_i32(w.pass);
            buf.put_i32(w.sym);
        }
    }

    pub fn read_resume(buf: &mut ResumeBuffer) -> Result<WorkList, EngineError> {
        let count = buf.get_i32()?;
        let mut list = WorkList::new();
        for _ in 0..count {
            list.items.push(WorkItem {
                x_start: buf.get_i32()?,
                x_stop: buf.get_i32()?,
                x_begin: buf.get_i32()?,
                y_start: buf.get_i32()?,
                y_stop: buf.get_i32()?,
                y_begin: buf.get_i32()?,
                pass: buf.get_i32()?,
                sym: buf.get_i32()?,
            });
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::resume::RESUME_VERSION;
    use crate::util::MemoryBuffer;

    #[test]
    fn vertically_adjacent_rows_merge() {
        let mut list = WorkList::new();
        list.add(WorkItem::fresh(0, 99, 0, 9)).unwrap();
        list.add(WorkItem::fresh(0, 99, 10, 19)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].y_stop, 19);
    }

    #[test]
    fn horizontally_adjacent_columns_merge() {
        let mut list = WorkList::new();
        list.add(WorkItem::fresh(50, 99, 0, 9)).unwrap();
        list.add(WorkItem::fresh(0, 49, 0, 9)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].x_start, 0);
        assert_eq!(list.items()[0].x_stop, 99);
    }

    #[test]
    fn started_rectangles_do_not_merge() {
        let mut list = WorkList::new();
        let mut started = WorkItem::fresh(0, 99, 0, 9);
        started.y_begin = 5;
        list.add(started).unwrap();
        list.add(WorkItem::fresh(0, 99, 10, 19)).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn sorted_by_pass_then_position() {
        let mut list = WorkList::new();
        let mut late = WorkItem::fresh(0, 9, 20, 29);
        late.pass = 2;
        list.add(late).unwrap();
        let mut low = WorkItem::fresh(0, 9, 40, 49);
        low.pass = 1;
        list.add(low).unwrap();
        let mut top = WorkItem::fresh(0, 9, 0, 9);
        top.pass = 1;
        list.add(top).unwrap();
        let passes: Vec<(i32, i32)> = list.items().iter().map(|w| (w.pass, w.y_start)).collect();
        assert_eq!(passes, vec![(1, 0), (1, 40), (2, 20)]);
    }

    #[test]
    fn full_list_rejects_and_keeps_contents() {
        let mut list = WorkList::new();
        for i in 0..MAX_CALC_WORK as i32 {
            // alternate passes so nothing merges
            let mut w = WorkItem::fresh(0, 9, i * 20, i * 20 + 9);
            w.pass = i % 2;
            list.add(w).unwrap();
        }
        assert_eq!(list.len(), MAX_CALC_WORK);
        let err = list.add(WorkItem::fresh(0, 9, 500, 509));
        assert_eq!(err, Err(EngineError::WorkListFull));
        assert_eq!(list.len(), MAX_CALC_WORK);
    }

    #[test]
    fn no_mergeable_pair_survives_tidy() {
        let mut list = WorkList::new();
        for y in [30, 0, 10, 20] {
            list.add(WorkItem::fresh(0, 63, y, y + 9)).unwrap();
        }
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].y_start, 0);
        assert_eq!(list.items()[0].y_stop, 39);
    }

    #[test]
    fn resume_round_trip() {
        let mut list = WorkList::new();
        list.add(WorkItem::fresh(0, 99, 0, 9)).unwrap();
        let mut two = WorkItem::fresh(0, 99, 30, 39);
        two.pass = 1;
        two.sym = 1;
        list.add(two).unwrap();

        let mut buf = ResumeBuffer::new(512, RESUME_VERSION);
        list.write_resume(&mut buf);
        assert_eq!(buf.start(), RESUME_VERSION);
        let back = WorkList::read_resume(&mut buf).unwrap();
        assert_eq!(back.items(), list.items());
    }

    #[test]
    fn fix_clips_and_drops_offscreen() {
        let mut fb = MemoryBuffer::new(100, 50);
        let mut list = WorkList::new();
        list.add(WorkItem::fresh(-10, 40, -5, 20)).unwrap();
        list.add(WorkItem::fresh(0, 99, 60, 70)).unwrap(); // fully below
        list.fix(&mut fb, 100, 50);
        assert_eq!(list.len(), 1);
        let w = list.items()[0];
        assert_eq!((w.x_start, w.y_start), (0, 0));
        assert_eq!((w.x_stop, w.y_stop), (40, 20));
    }

    #[test]
    fn fix_splits_symmetry_rectangle_off_top() {
        let mut fb = MemoryBuffer::new(100, 50);
        for x in 0..100 {
            fb.put_color(x, 5, 9);
        }
        let mut list = WorkList::new();
        let mut w = WorkItem::fresh(0, 99, -10, 30);
        w.sym = 1;
        list.add(w).unwrap();
        list.fix(&mut fb, 100, 50);
        // still-mirrored rows [0, 20] stay symmetric, the rest restarts
        assert_eq!(list.len(), 2);
        assert!(list.items().iter().any(|w| w.y_start == 0 && w.y_stop == 20 && w.sym == 1));
        assert!(list.items().iter().any(|w| w.y_start == 21 && w.sym == 0 && w.pass == 0));
        // the restarted span was wiped
        assert_eq!(fb.get_color(50, 25), 0);
    }

    #[test]
    fn lowest_pass_over_pending_windows() {
        let mut list = WorkList::new();
        let mut a = WorkItem::fresh(0, 9, 0, 9);
        a.pass = 3;
        let mut b = WorkItem::fresh(0, 9, 20, 29);
        b.pass = 1;
        list.add(a).unwrap();
        list.add(b).unwrap();
        assert_eq!(list.lowest_pass(), Some(1));
    }
}
