//! Curated layer: daily quotas joined with the fund dimension and reduced by
//! (date, attribute).

use chrono::NaiveDate;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::dimensions::DimFundo;
use crate::process::normalize::Cnpj;
use crate::process::records::CotaDiaria;
use crate::table::{Cell, CellKind, Column, Table};

/// Fund attribute a curated table is grouped by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Grouping {
    Categoria,
    Gestora,
    GrupoLooker,
}

impl Grouping {
    pub const ALL: [Grouping; 3] = [Grouping::Categoria, Grouping::Gestora, Grouping::GrupoLooker];

    pub fn table_name(&self) -> &'static str {
        match self {
            Grouping::Categoria => "curated_cotas_por_categoria",
            Grouping::Gestora => "curated_cotas_por_gestora",
            Grouping::GrupoLooker => "curated_cotas_por_grupo_looker",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Grouping::Categoria => "categoria_cvm",
            Grouping::Gestora => "gestora",
            Grouping::GrupoLooker => "grupo_looker",
        }
    }

    fn attribute<'a>(&self, dim: Option<&'a DimFundo>) -> Option<&'a str> {
        let dim = dim?;
        match self {
            Grouping::Categoria => dim.categoria_cvm.as_deref(),
            Grouping::Gestora => dim.gestora.as_deref(),
            Grouping::GrupoLooker => dim.grupo_looker.as_deref(),
        }
    }
}

/// One reduced row: mean quota value and total net worth of a group.
#[derive(Clone, Debug, PartialEq)]
pub struct CuratedCota {
    pub data_cotacao: Option<NaiveDate>,
    pub atributo: Option<String>,
    /// `None` when no row of the group had a quota value.
    pub valor_cota: Option<f64>,
    pub patrimonio_liquido: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CuratedTable {
    pub grouping: Grouping,
    pub rows: Vec<CuratedCota>,
}

impl CuratedTable {
    pub fn table(&self) -> Table {
        Table {
            columns: vec![
                Column::new("data_cotacao", CellKind::Date),
                Column::new(self.grouping.column(), CellKind::Text),
                Column::new("valor_cota", CellKind::Float),
                Column::new("patrimonio_liquido", CellKind::Float),
            ],
            rows: self
                .rows
                .iter()
                .map(|r| {
                    vec![
                        Cell::Date(r.data_cotacao),
                        Cell::from(&r.atributo),
                        Cell::Float(r.valor_cota),
                        Cell::Float(Some(r.patrimonio_liquido)),
                    ]
                })
                .collect(),
        }
    }
}

/// Group key; missing dates/attributes are groups of their own, sorted last.
#[derive(Clone, Debug, PartialEq, Eq)]
struct GroupKey {
    date: Option<NaiveDate>,
    attribute: Option<String>,
}

fn none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        none_last(&self.date, &other.date).then_with(|| none_last(&self.attribute, &other.attribute))
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Accumulator {
    quota_sum: f64,
    quota_count: usize,
    net_worth: f64,
}

/// Left join + group-by for one attribute.
fn aggregate(
    daily: &[CotaDiaria],
    dims: &HashMap<&Cnpj, &DimFundo>,
    grouping: Grouping,
) -> CuratedTable {
    let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
    for row in daily {
        let dim = row.cnpj.as_ref().and_then(|c| dims.get(c).copied());
        let key = GroupKey {
            date: row.data_cotacao,
            attribute: grouping.attribute(dim).map(str::to_string),
        };
        let acc = groups.entry(key).or_default();
        if let Some(v) = row.valor_cota {
            acc.quota_sum += v;
            acc.quota_count += 1;
        }
        if let Some(pl) = row.patrimonio_liquido {
            acc.net_worth += pl;
        }
    }

    let rows = groups
        .into_iter()
        .map(|(key, acc)| CuratedCota {
            data_cotacao: key.date,
            atributo: key.attribute,
            valor_cota: (acc.quota_count > 0).then(|| acc.quota_sum / acc.quota_count as f64),
            patrimonio_liquido: acc.net_worth,
        })
        .collect();
    CuratedTable { grouping, rows }
}

/// Build the three curated tables. Produces nothing when either input is
/// absent or the fact table is empty.
pub fn build_curated_tables(
    daily: Option<&[CotaDiaria]>,
    dim_fundo: Option<&[DimFundo]>,
) -> BTreeMap<&'static str, CuratedTable> {
    let (Some(daily), Some(dim_fundo)) = (daily, dim_fundo) else {
        return BTreeMap::new();
    };
    if daily.is_empty() {
        return BTreeMap::new();
    }

    // first entry wins if a fund is configured twice
    let mut dims: HashMap<&Cnpj, &DimFundo> = HashMap::new();
    for d in dim_fundo {
        if let Some(cnpj) = d.cnpj.as_ref() {
            dims.entry(cnpj).or_insert(d);
        }
    }

    Grouping::ALL
        .par_iter()
        .map(|g| (g.table_name(), aggregate(daily, &dims, *g)))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}
