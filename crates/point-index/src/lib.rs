use geo::{Coord, Rect};
use log::info;
use rstar::{AABB, RTree, primitives::GeomWithData};

/// Anything that sits at a single geographic coordinate (`x` = lon, `y` = lat).
pub trait Located {
    fn location(&self) -> Coord<f64>;
}

impl Located for Coord<f64> {
    fn location(&self) -> Coord<f64> {
        *self
    }
}

/// Immutable collection of located items with an r-tree over their coordinates.
///
/// Items whose coordinate is not finite are kept in the collection but never
/// returned by rectangle queries.
pub struct PointIndex<T> {
    items: Vec<T>,
    r_tree: RTree<GeomWithData<Coord<f64>, usize>>,
}

impl<T: Located> PointIndex<T> {
    pub fn new(items: Vec<T>) -> Self {
        let r_tree = RTree::bulk_load(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| (idx, item.location()))
                .filter(|(_, coord)| coord.x.is_finite() && coord.y.is_finite())
                .map(|(idx, coord)| GeomWithData::new(coord, idx))
                .collect(),
        );

        info!(
            "Created r-tree: {} of {} items indexed",
            r_tree.size(),
            items.len()
        );

        Self { items, r_tree }
    }

    /// Items inside `rect`, boundary inclusive.
    pub fn locate_in_rect(&self, rect: &Rect<f64>) -> Vec<&T> {
        let envelope = AABB::from_corners(rect.min(), rect.max());
        self.r_tree
            .locate_in_envelope(&envelope)
            .map(|entry| &self.items[entry.data])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T> Default for PointIndex<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            r_tree: RTree::new(),
        }
    }
}

impl<T: Located> FromIterator<T> for PointIndex<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Grows `rect` by `fraction` of its own width and height on every side.
pub fn pad_rect(rect: &Rect<f64>, fraction: f64) -> Rect<f64> {
    let pad_x = rect.width() * fraction;
    let pad_y = rect.height() * fraction;

    Rect::new(
        Coord {
            x: rect.min().x - pad_x,
            y: rect.min().y - pad_y,
        },
        Coord {
            x: rect.max().x + pad_x,
            y: rect.max().y + pad_y,
        },
    )
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use geo::{Coord, Rect, coord};

    use super::{Located, PointIndex, pad_rect};

    struct Site {
        name: &'static str,
        coord: Coord<f64>,
    }

    impl Located for Site {
        fn location(&self) -> Coord<f64> {
            self.coord
        }
    }

    fn sites() -> PointIndex<Site> {
        PointIndex::new(vec![
            Site {
                name: "EDDB",
                coord: coord! { x: 13.5033, y: 52.3667 },
            },
            Site {
                name: "EDDM",
                coord: coord! { x: 11.7861, y: 48.3538 },
            },
            Site {
                name: "EDNY",
                coord: coord! { x: 9.5117, y: 47.6713 },
            },
            Site {
                name: "broken",
                coord: coord! { x: f64::NAN, y: 50.0 },
            },
        ])
    }

    #[test]
    fn rect_query() {
        let index = sites();
        let south = Rect::new(coord! { x: 5.0, y: 47.0 }, coord! { x: 15.0, y: 49.0 });

        let mut names: Vec<_> = index
            .locate_in_rect(&south)
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();

        assert_eq!(names, vec!["EDDM", "EDNY"]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn rect_query_includes_boundary() {
        let index = sites();
        let edge = Rect::new(coord! { x: 9.5117, y: 47.6713 }, coord! { x: 10.0, y: 48.0 });

        assert_eq!(
            index
                .locate_in_rect(&edge)
                .into_iter()
                .map(|s| s.name)
                .collect::<Vec<_>>(),
            vec!["EDNY"]
        );
    }

    #[test]
    fn empty_index() {
        let index = PointIndex::<Site>::default();
        let world = Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 });

        assert!(index.is_empty());
        assert_eq!(index.locate_in_rect(&world).len(), 0);
    }

    #[test]
    fn padding() {
        let rect = Rect::new(coord! { x: 8.0, y: 48.0 }, coord! { x: 10.0, y: 49.0 });
        let padded = pad_rect(&rect, 0.1);

        assert_relative_eq!(padded.min().x, 7.8, epsilon = 1e-9);
        assert_relative_eq!(padded.max().x, 10.2, epsilon = 1e-9);
        assert_relative_eq!(padded.min().y, 47.9, epsilon = 1e-9);
        assert_relative_eq!(padded.max().y, 49.1, epsilon = 1e-9);
    }
}
