//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
    }

    #[test]
    fn test_side_deserialization() {
        let buy: Side = serde_json::from_str("\"BUY\"").unwrap();
        let sell: Side = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(buy, Side::Buy);
        assert_eq!(sell, Side::Sell);
    }

    #[test]
    fn test_side_from_str_is_case_insensitive() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("Sell".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn test_trade_value_is_shares_times_price() {
        let trade = Trade::new("AAPL", Side::Buy, 10, dec!(12.50), "test");
        assert_eq!(trade.value, dec!(125.00));
        assert!(trade.pnl.is_none());
        assert!(trade.paper);
        assert!(!trade.is_win());
    }

    #[test]
    fn test_trade_with_pnl() {
        let win = Trade::new("AAPL", Side::Sell, 10, dec!(15), "tp").with_pnl(dec!(25));
        let loss = Trade::new("AAPL", Side::Sell, 10, dec!(9), "sl").with_pnl(dec!(-35));
        assert!(win.is_win());
        assert!(!loss.is_win());
    }

    #[test]
    fn test_trade_ids_are_unique() {
        let a = Trade::new("AAPL", Side::Buy, 1, dec!(1), "a");
        let b = Trade::new("AAPL", Side::Buy, 1, dec!(1), "b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("brk.b"), Some("BRK.B".to_string()));
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("AAPL;DROP"), None);
        assert_eq!(normalize_symbol("WAYTOOLONGSYMBOL"), None);
    }

    #[test]
    fn test_position_mark_tracks_high_water() {
        let mut pos = Position::open("AAPL", 10, dec!(10));
        pos.mark(dec!(12));
        pos.mark(dec!(11));
        assert_eq!(pos.current_price, dec!(11));
        assert_eq!(pos.high_water, dec!(12));
        assert_eq!(pos.unrealized_pnl(), dec!(10));
        assert_eq!(pos.return_pct(), dec!(0.1));
        assert_eq!(pos.market_value(), dec!(110));
        assert_eq!(pos.cost_basis(), dec!(100));
    }
}
